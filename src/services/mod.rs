//! Adapters to collaborators outside the database: payments, mail, event bus.
pub mod events;
pub mod mailer;
pub mod payment;

pub use events::EventBus;
pub use mailer::{Email, LogMailer, Mailer};
pub use payment::{GatewayOrder, PaymentGateway, RazorpayGateway};
