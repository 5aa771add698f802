use sqlx::PgConnection;

use crate::domain::aggregates::{CategoryOffer, DefaultOffer, OfferBook, ProductOffer, ReferralOffer};
use crate::error::Result;

const LIVE: &str = "WHERE is_active AND starts_at <= NOW() AND ends_at > NOW()";

/// Loads every live discount offer. Offer tables are small, so one pass serves a whole listing.
pub async fn load_offer_book(conn: &mut PgConnection) -> Result<OfferBook> {
    let products = sqlx::query_as::<_, ProductOffer>(&format!("SELECT * FROM product_offers {LIVE}"))
        .fetch_all(&mut *conn).await?;
    let categories = sqlx::query_as::<_, CategoryOffer>(&format!("SELECT * FROM category_offers {LIVE}"))
        .fetch_all(&mut *conn).await?;
    let defaults = sqlx::query_as::<_, DefaultOffer>(&format!("SELECT * FROM default_offers {LIVE}"))
        .fetch_all(&mut *conn).await?;
    Ok(OfferBook::new(&products, &categories, &defaults))
}

pub async fn live_referral_offers(conn: &mut PgConnection) -> Result<Vec<ReferralOffer>> {
    Ok(sqlx::query_as::<_, ReferralOffer>(&format!("SELECT * FROM referral_offers {LIVE} ORDER BY created_at DESC"))
        .fetch_all(&mut *conn)
        .await?)
}
