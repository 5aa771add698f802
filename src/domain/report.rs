//! Sales report aggregation over order lines loaded for a date range.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

pub const TOP_N: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPeriod { Daily, Weekly, Monthly, Yearly, Custom }

impl ReportPeriod {
    /// Half-open `[from, to)` range for the period, ending at the close of today.
    pub fn range(self, now: DateTime<Utc>, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<(DateTime<Utc>, DateTime<Utc>), ReportError> {
        let end_of = |d: NaiveDate| (d + Duration::days(1)).and_time(NaiveTime::MIN).and_utc();
        let today = now.date_naive();
        let days_back = |n: i64| Ok(((today - Duration::days(n - 1)).and_time(NaiveTime::MIN).and_utc(), end_of(today)));
        match self {
            Self::Daily => days_back(1),
            Self::Weekly => days_back(7),
            Self::Monthly => days_back(30),
            Self::Yearly => days_back(365),
            Self::Custom => {
                let (Some(from), Some(to)) = (from, to) else { return Err(ReportError::MissingRange) };
                if to < from { return Err(ReportError::InvertedRange); }
                Ok((from.and_time(NaiveTime::MIN).and_utc(), end_of(to)))
            }
        }
    }
}

/// One order line joined with its order, as loaded for reporting.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct SalesRow {
    pub order_id: Uuid,
    pub order_created_at: DateTime<Utc>,
    pub order_total: Decimal,
    pub coupon_discount: Decimal,
    pub product_id: Uuid,
    pub product_name: String,
    pub category_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SalesTotals {
    pub order_count: i64,
    pub items_sold: i64,
    pub gross: Decimal,
    pub offer_discount: Decimal,
    pub coupon_discount: Decimal,
    pub net: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailySales { pub date: NaiveDate, #[serde(flatten)] pub totals: SalesTotals }

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TopSeller { pub name: String, pub quantity: i64, pub revenue: Decimal }

#[derive(Clone, Debug, Serialize)]
pub struct SalesReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub totals: SalesTotals,
    pub daily: Vec<DailySales>,
    pub top_products: Vec<TopSeller>,
    pub top_categories: Vec<TopSeller>,
}

impl SalesTotals {
    fn add_line(&mut self, row: &SalesRow) {
        let gross = row.unit_price * Decimal::from(row.quantity);
        self.items_sold += i64::from(row.quantity);
        self.gross += gross;
        self.offer_discount += gross - row.line_total;
    }

    fn add_order(&mut self, row: &SalesRow) {
        self.order_count += 1;
        self.coupon_discount += row.coupon_discount;
        self.net += row.order_total;
    }
}

impl SalesReport {
    pub fn aggregate(from: DateTime<Utc>, to: DateTime<Utc>, rows: &[SalesRow]) -> Self {
        let mut totals = SalesTotals::default();
        let mut daily: BTreeMap<NaiveDate, SalesTotals> = BTreeMap::new();
        let mut seen = HashSet::new();
        let mut products: HashMap<Uuid, TopSeller> = HashMap::new();
        let mut categories: HashMap<&str, TopSeller> = HashMap::new();

        for row in rows {
            let day = daily.entry(row.order_created_at.date_naive()).or_default();
            totals.add_line(row);
            day.add_line(row);
            if seen.insert(row.order_id) {
                totals.add_order(row);
                day.add_order(row);
            }
            let qty = i64::from(row.quantity);
            let p = products.entry(row.product_id).or_insert_with(|| TopSeller { name: row.product_name.clone(), quantity: 0, revenue: Decimal::ZERO });
            p.quantity += qty;
            p.revenue += row.line_total;
            let c = categories.entry(row.category_name.as_str()).or_insert_with(|| TopSeller { name: row.category_name.clone(), quantity: 0, revenue: Decimal::ZERO });
            c.quantity += qty;
            c.revenue += row.line_total;
        }

        Self {
            from,
            to,
            totals,
            daily: daily.into_iter().map(|(date, totals)| DailySales { date, totals }).collect(),
            top_products: top(products.into_values()),
            top_categories: top(categories.into_values()),
        }
    }

    /// CSV rendering: one row per day followed by a totals row.
    pub fn to_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let mut w = csv::Writer::from_writer(Vec::new());
        w.write_record(["date", "orders", "items_sold", "gross", "offer_discount", "coupon_discount", "net"])?;
        let mut write = |label: String, t: &SalesTotals| {
            w.write_record([
                label, t.order_count.to_string(), t.items_sold.to_string(), t.gross.to_string(),
                t.offer_discount.to_string(), t.coupon_discount.to_string(), t.net.to_string(),
            ])
        };
        for d in &self.daily { write(d.date.to_string(), &d.totals)?; }
        write("total".to_string(), &self.totals)?;
        w.into_inner().map_err(|e| csv::Error::from(e.into_error()))
    }
}

fn top(sellers: impl Iterator<Item = TopSeller>) -> Vec<TopSeller> {
    let mut v: Vec<TopSeller> = sellers.collect();
    v.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| b.revenue.cmp(&a.revenue)).then_with(|| a.name.cmp(&b.name)));
    v.truncate(TOP_N);
    v
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ReportError { MissingRange, InvertedRange }
impl std::error::Error for ReportError {}
impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRange => write!(f, "custom reports need both from and to dates"),
            Self::InvertedRange => write!(f, "report end date is before its start date"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(order_id: Uuid, day: u32, product: (Uuid, &str), category: &str, qty: i32, unit: i64, line: i64, total: i64, coupon: i64) -> SalesRow {
        SalesRow {
            order_id, order_created_at: Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap(),
            order_total: Decimal::new(total, 0), coupon_discount: Decimal::new(coupon, 0),
            product_id: product.0, product_name: product.1.into(), category_name: category.into(),
            quantity: qty, unit_price: Decimal::new(unit, 0), line_total: Decimal::new(line, 0),
        }
    }

    #[test]
    fn test_aggregate_counts_orders_once() {
        let (o1, o2) = (Uuid::new_v4(), Uuid::new_v4());
        let phone = (Uuid::new_v4(), "Phone");
        let case = (Uuid::new_v4(), "Case");
        let rows = vec![
            // order 1: phone x1 at 1000 sold for 900, case x2 at 100; coupon 50, total 1050
            row(o1, 1, phone, "Mobiles", 1, 1000, 900, 1050, 50),
            row(o1, 1, case, "Accessories", 2, 100, 200, 1050, 50),
            row(o2, 2, case, "Accessories", 3, 100, 300, 300, 0),
        ];
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let report = SalesReport::aggregate(from, from + Duration::days(2), &rows);

        assert_eq!(report.totals.order_count, 2);
        assert_eq!(report.totals.items_sold, 6);
        assert_eq!(report.totals.gross, Decimal::new(1500, 0));
        assert_eq!(report.totals.offer_discount, Decimal::new(100, 0));
        assert_eq!(report.totals.coupon_discount, Decimal::new(50, 0));
        assert_eq!(report.totals.net, Decimal::new(1350, 0));

        assert_eq!(report.daily.len(), 2);
        assert_eq!(report.daily[0].totals.order_count, 1);
        assert_eq!(report.daily[1].totals.net, Decimal::new(300, 0));

        assert_eq!(report.top_products[0].name, "Case");
        assert_eq!(report.top_products[0].quantity, 5);
        assert_eq!(report.top_categories[0].name, "Accessories");
    }

    #[test]
    fn test_empty_report() {
        let now = Utc::now();
        let report = SalesReport::aggregate(now, now, &[]);
        assert_eq!(report.totals, SalesTotals::default());
        assert!(report.daily.is_empty());
    }

    #[test]
    fn test_period_ranges() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        let (from, to) = ReportPeriod::Daily.range(now, None, None).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());

        let (from, _) = ReportPeriod::Weekly.range(now, None, None).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());

        let d = |day| NaiveDate::from_ymd_opt(2024, 2, day).unwrap();
        let (from, to) = ReportPeriod::Custom.range(now, Some(d(1)), Some(d(29))).unwrap();
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(ReportPeriod::Custom.range(now, Some(d(5)), Some(d(4))), Err(ReportError::InvertedRange));
        assert_eq!(ReportPeriod::Custom.range(now, None, Some(d(4))), Err(ReportError::MissingRange));
    }

    #[test]
    fn test_csv_has_totals_row() {
        let o = Uuid::new_v4();
        let rows = vec![row(o, 5, (Uuid::new_v4(), "Phone"), "Mobiles", 1, 1000, 900, 900, 0)];
        let now = Utc::now();
        let csv = String::from_utf8(SalesReport::aggregate(now, now, &rows).to_csv().unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,orders,items_sold,gross,offer_discount,coupon_discount,net");
        assert_eq!(lines[1], "2024-03-05,1,1,1000,100,0,900");
        assert_eq!(lines[2], "total,1,1,1000,100,0,900");
    }
}
