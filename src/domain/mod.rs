//! Storefront domain: aggregates, value objects, events and reporting.
pub mod aggregates;
pub mod events;
pub mod report;
pub mod value_objects;
