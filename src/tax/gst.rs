//! GST (Goods and Services Tax) calculation engine for Indian tax compliance

use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::LineItemInput;

/// Round a monetary value to 2 places, half-up
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}

fn hundred() -> BigDecimal {
    BigDecimal::from(100)
}

/// Whether a supply stays inside the home state or crosses state borders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyType {
    /// Taxed as CGST + SGST
    IntraState,
    /// Taxed as IGST
    InterState,
}

impl SupplyType {
    /// Determine the supply type from the counterparty GSTIN.
    ///
    /// The first two characters of a GSTIN are the state code. A missing or
    /// truncated GSTIN is treated as an intra-state supply.
    pub fn for_gstin(gstin: Option<&str>, home_state_code: &str) -> Self {
        match gstin.map(str::trim).and_then(|g| g.get(..2)) {
            Some(state) if state != home_state_code => SupplyType::InterState,
            _ => SupplyType::IntraState,
        }
    }
}

/// GST rate structure for Indian taxation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GstRate {
    /// Total GST rate percentage (e.g., 18.0 for 18%)
    pub total_rate: BigDecimal,
    /// CGST rate percentage (Central GST)
    pub cgst_rate: BigDecimal,
    /// SGST rate percentage (State GST)
    pub sgst_rate: BigDecimal,
    /// IGST rate percentage (Integrated GST)
    pub igst_rate: BigDecimal,
}

impl GstRate {
    /// Create a new GST rate with intra-state rates (CGST + SGST)
    pub fn intra_state(total_rate: BigDecimal) -> Self {
        let half_rate = &total_rate / BigDecimal::from(2);
        Self {
            total_rate,
            cgst_rate: half_rate.clone(),
            sgst_rate: half_rate,
            igst_rate: BigDecimal::from(0),
        }
    }

    /// Create a new GST rate with inter-state rates (IGST)
    pub fn inter_state(total_rate: BigDecimal) -> Self {
        Self {
            total_rate: total_rate.clone(),
            cgst_rate: BigDecimal::from(0),
            sgst_rate: BigDecimal::from(0),
            igst_rate: total_rate,
        }
    }

    pub fn for_supply(total_rate: BigDecimal, supply: SupplyType) -> Self {
        match supply {
            SupplyType::IntraState => Self::intra_state(total_rate),
            SupplyType::InterState => Self::inter_state(total_rate),
        }
    }

    /// Validate that the GST rate structure is correct
    pub fn validate(&self) -> Result<(), GstError> {
        let calculated_total = &self.cgst_rate + &self.sgst_rate + &self.igst_rate;

        if calculated_total != self.total_rate {
            return Err(GstError::InvalidRate(format!(
                "GST components don't add up to total rate: {} != {}",
                calculated_total, self.total_rate
            )));
        }

        if self.igst_rate == BigDecimal::from(0) && self.cgst_rate != self.sgst_rate {
            return Err(GstError::InvalidRate(
                "CGST and SGST rates must be equal for intra-state transactions".to_string(),
            ));
        }

        if self.igst_rate > BigDecimal::from(0)
            && (self.cgst_rate > BigDecimal::from(0) || self.sgst_rate > BigDecimal::from(0))
        {
            return Err(GstError::InvalidRate(
                "Only IGST should be applicable for inter-state transactions".to_string(),
            ));
        }

        Ok(())
    }
}

/// Standard GST slabs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GstCategory {
    /// Essential items (food, medicines, etc.) - 0%
    Essential,
    /// Reduced rate items - 5%
    Reduced,
    /// Standard rate items - 12%
    Standard,
    /// Higher rate items - 18%
    Higher,
    /// Luxury/Sin goods - 28%
    Luxury,
}

impl GstCategory {
    const ALL: [GstCategory; 5] = [
        GstCategory::Essential,
        GstCategory::Reduced,
        GstCategory::Standard,
        GstCategory::Higher,
        GstCategory::Luxury,
    ];

    /// Get the standard GST rate for this category
    pub fn rate(&self) -> BigDecimal {
        match self {
            GstCategory::Essential => BigDecimal::from(0),
            GstCategory::Reduced => BigDecimal::from(5),
            GstCategory::Standard => BigDecimal::from(12),
            GstCategory::Higher => BigDecimal::from(18),
            GstCategory::Luxury => BigDecimal::from(28),
        }
    }

    /// Slab matching a percentage, if it is one of the standard rates
    pub fn from_rate(rate: &BigDecimal) -> Option<Self> {
        Self::ALL.into_iter().find(|c| &c.rate() == rate)
    }
}

/// Invoice line with its computed amounts, all rounded to 2 places
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub item_id: Option<String>,
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub discount_percent: BigDecimal,
    pub tax_percent: BigDecimal,
    pub line_subtotal: BigDecimal,
    pub line_discount: BigDecimal,
    pub line_taxable: BigDecimal,
    pub line_tax: BigDecimal,
    pub line_total: BigDecimal,
}

impl LineItem {
    /// Compute one line: subtotal, discount, taxable value, tax and total
    pub fn compute(input: &LineItemInput, tax_percent: BigDecimal) -> Result<Self, GstError> {
        if input.quantity < BigDecimal::from(0) {
            return Err(GstError::InvalidLine(format!(
                "quantity cannot be negative for '{}'",
                input.description
            )));
        }
        if input.unit_price < BigDecimal::from(0) {
            return Err(GstError::InvalidLine(format!(
                "unit price cannot be negative for '{}'",
                input.description
            )));
        }
        if input.discount_percent < BigDecimal::from(0) || input.discount_percent > hundred() {
            return Err(GstError::InvalidLine(format!(
                "discount must be between 0 and 100 for '{}'",
                input.description
            )));
        }
        if tax_percent < BigDecimal::from(0) || tax_percent > hundred() {
            return Err(GstError::InvalidRate(format!(
                "tax percent {} out of range for '{}'",
                tax_percent, input.description
            )));
        }

        let raw_subtotal = &input.quantity * &input.unit_price;
        let line_subtotal = round_money(&raw_subtotal);
        let line_discount = round_money(&((&raw_subtotal * &input.discount_percent) / hundred()));
        let line_taxable = &line_subtotal - &line_discount;
        let line_tax = round_money(&((&line_taxable * &tax_percent) / hundred()));
        let line_total = &line_taxable + &line_tax;

        Ok(Self {
            item_id: input.item_id.clone(),
            description: input.description.clone(),
            quantity: input.quantity.clone(),
            unit_price: input.unit_price.clone(),
            discount_percent: input.discount_percent.clone(),
            tax_percent,
            line_subtotal,
            line_discount,
            line_taxable,
            line_tax,
            line_total,
        })
    }
}

/// Taxable value and tax collected at one GST rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlabSummary {
    pub category: Option<GstCategory>,
    pub rate: GstRate,
    pub taxable_amount: BigDecimal,
    pub cgst: BigDecimal,
    pub sgst: BigDecimal,
    pub igst: BigDecimal,
}

/// Document totals with the GST split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxTotals {
    pub supply_type: SupplyType,
    pub items: Vec<LineItem>,
    pub subtotal: BigDecimal,
    pub discount_amount: BigDecimal,
    pub taxable_amount: BigDecimal,
    pub cgst: BigDecimal,
    pub sgst: BigDecimal,
    pub igst: BigDecimal,
    pub total_tax: BigDecimal,
    pub grand_total: BigDecimal,
    pub slabs: Vec<SlabSummary>,
}

impl TaxTotals {
    /// Aggregate computed lines and split the tax for the supply type
    pub fn from_lines(items: Vec<LineItem>, supply_type: SupplyType) -> Self {
        let subtotal: BigDecimal = items.iter().map(|l| &l.line_subtotal).sum();
        let discount_amount: BigDecimal = items.iter().map(|l| &l.line_discount).sum();
        let taxable_amount: BigDecimal = items.iter().map(|l| &l.line_taxable).sum();
        let total_tax: BigDecimal = items.iter().map(|l| &l.line_tax).sum();

        let (cgst, sgst, igst) = split_tax(&total_tax, supply_type);
        let grand_total = &taxable_amount + &total_tax;
        let slabs = slab_summaries(&items, supply_type);

        Self {
            supply_type,
            items,
            subtotal,
            discount_amount,
            taxable_amount,
            cgst,
            sgst,
            igst,
            total_tax,
            grand_total,
            slabs,
        }
    }
}

/// Split a tax amount into (CGST, SGST, IGST).
///
/// CGST takes the rounded half and SGST the remainder, so an odd paisa goes
/// to CGST and the components always add up to `tax`.
fn split_tax(tax: &BigDecimal, supply_type: SupplyType) -> (BigDecimal, BigDecimal, BigDecimal) {
    match supply_type {
        SupplyType::IntraState => {
            let cgst = round_money(&(tax / BigDecimal::from(2)));
            let sgst = tax - &cgst;
            (cgst, sgst, BigDecimal::from(0))
        }
        SupplyType::InterState => (BigDecimal::from(0), BigDecimal::from(0), tax.clone()),
    }
}

fn slab_summaries(items: &[LineItem], supply_type: SupplyType) -> Vec<SlabSummary> {
    let mut by_rate: BTreeMap<BigDecimal, (BigDecimal, BigDecimal)> = BTreeMap::new();
    for line in items {
        let entry = by_rate
            .entry(line.tax_percent.clone())
            .or_insert_with(|| (BigDecimal::from(0), BigDecimal::from(0)));
        entry.0 += &line.line_taxable;
        entry.1 += &line.line_tax;
    }

    by_rate
        .into_iter()
        .map(|(rate, (taxable_amount, tax))| {
            let (cgst, sgst, igst) = split_tax(&tax, supply_type);
            SlabSummary {
                category: GstCategory::from_rate(&rate),
                rate: GstRate::for_supply(rate, supply_type),
                taxable_amount,
                cgst,
                sgst,
                igst,
            }
        })
        .collect()
}

/// Converts line items into document totals
#[derive(Debug, Clone)]
pub struct TaxCalculator {
    home_state_code: String,
    default_tax_percent: BigDecimal,
}

impl TaxCalculator {
    pub fn new(home_state_code: impl Into<String>, default_tax_percent: BigDecimal) -> Self {
        Self {
            home_state_code: home_state_code.into(),
            default_tax_percent,
        }
    }

    pub fn home_state_code(&self) -> &str {
        &self.home_state_code
    }

    /// Compute totals for a document raised against the given counterparty GSTIN
    pub fn calculate(
        &self,
        items: &[LineItemInput],
        counterparty_gstin: Option<&str>,
    ) -> Result<TaxTotals, GstError> {
        let supply_type = SupplyType::for_gstin(counterparty_gstin, &self.home_state_code);
        self.calculate_for_supply(items, supply_type)
    }

    pub fn calculate_for_supply(
        &self,
        items: &[LineItemInput],
        supply_type: SupplyType,
    ) -> Result<TaxTotals, GstError> {
        let lines = items
            .iter()
            .map(|input| {
                let tax_percent = input
                    .tax_percent
                    .clone()
                    .unwrap_or_else(|| self.default_tax_percent.clone());
                LineItem::compute(input, tax_percent)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TaxTotals::from_lines(lines, supply_type))
    }

    /// Compute totals with every line taxed at zero (exports and imports in foreign currency)
    pub fn calculate_untaxed(&self, items: &[LineItemInput]) -> Result<TaxTotals, GstError> {
        let lines = items
            .iter()
            .map(|input| LineItem::compute(input, BigDecimal::from(0)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TaxTotals::from_lines(lines, SupplyType::InterState))
    }
}

/// GST-related errors
#[derive(Debug, thiserror::Error)]
pub enum GstError {
    #[error("Invalid GST rate: {0}")]
    InvalidRate(String),
    #[error("Invalid line item: {0}")]
    InvalidLine(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn calculator() -> TaxCalculator {
        TaxCalculator::new("27", BigDecimal::from(18))
    }

    #[test]
    fn test_gst_rate_intra_state() {
        let rate = GstRate::intra_state(BigDecimal::from(18));
        assert_eq!(rate.cgst_rate, BigDecimal::from(9));
        assert_eq!(rate.sgst_rate, BigDecimal::from(9));
        assert_eq!(rate.igst_rate, BigDecimal::from(0));
        assert!(rate.validate().is_ok());
    }

    #[test]
    fn test_gst_rate_inter_state() {
        let rate = GstRate::inter_state(BigDecimal::from(18));
        assert_eq!(rate.cgst_rate, BigDecimal::from(0));
        assert_eq!(rate.igst_rate, BigDecimal::from(18));
        assert!(rate.validate().is_ok());
    }

    #[test]
    fn test_supply_type_from_gstin() {
        assert_eq!(
            SupplyType::for_gstin(Some("27AAPFU0939F1ZV"), "27"),
            SupplyType::IntraState
        );
        assert_eq!(
            SupplyType::for_gstin(Some("29AAGCB7383J1Z4"), "27"),
            SupplyType::InterState
        );
        assert_eq!(SupplyType::for_gstin(None, "27"), SupplyType::IntraState);
        assert_eq!(SupplyType::for_gstin(Some("2"), "27"), SupplyType::IntraState);
    }

    #[test]
    fn test_single_line_with_discount() {
        let input = LineItemInput::new("Tape roll", BigDecimal::from(10), BigDecimal::from(100))
            .discount(BigDecimal::from(10))
            .tax(BigDecimal::from(18));
        let line = LineItem::compute(&input, BigDecimal::from(18)).unwrap();

        assert_eq!(line.line_subtotal, BigDecimal::from(1000));
        assert_eq!(line.line_discount, BigDecimal::from(100));
        assert_eq!(line.line_taxable, BigDecimal::from(900));
        assert_eq!(line.line_tax, BigDecimal::from(162));
        assert_eq!(line.line_total, BigDecimal::from(1062));
    }

    #[test]
    fn test_intra_state_split() {
        let items = vec![LineItemInput::new("A", BigDecimal::from(2), BigDecimal::from(500))];
        let totals = calculator().calculate(&items, Some("27ABCDE1234F1Z5")).unwrap();

        assert_eq!(totals.total_tax, BigDecimal::from(180));
        assert_eq!(totals.cgst, BigDecimal::from(90));
        assert_eq!(totals.sgst, BigDecimal::from(90));
        assert_eq!(totals.igst, BigDecimal::from(0));
        assert_eq!(totals.grand_total, BigDecimal::from(1180));
    }

    #[test]
    fn test_inter_state_split() {
        let items = vec![LineItemInput::new("A", BigDecimal::from(2), BigDecimal::from(500))];
        let totals = calculator().calculate(&items, Some("29ABCDE1234F1Z5")).unwrap();

        assert_eq!(totals.igst, BigDecimal::from(180));
        assert_eq!(totals.cgst, BigDecimal::from(0));
        assert_eq!(totals.sgst, BigDecimal::from(0));
    }

    #[test]
    fn test_zero_lines_give_zero_totals() {
        let totals = calculator().calculate(&[], None).unwrap();
        assert_eq!(totals.subtotal, BigDecimal::from(0));
        assert_eq!(totals.total_tax, BigDecimal::from(0));
        assert_eq!(totals.grand_total, BigDecimal::from(0));
        assert!(totals.slabs.is_empty());
    }

    #[test]
    fn test_line_totals_reconcile_with_document_totals() {
        let items = vec![
            LineItemInput::new("A", dec("3"), dec("33.33"))
                .discount(dec("7.5"))
                .tax(BigDecimal::from(5)),
            LineItemInput::new("B", dec("1.5"), dec("19.99")).tax(BigDecimal::from(28)),
            LineItemInput::new("C", dec("7"), dec("0.35")).discount(dec("12.5")),
        ];
        let totals = calculator().calculate(&items, None).unwrap();

        let line_sum: BigDecimal = totals.items.iter().map(|l| &l.line_total).sum();
        let expected = &totals.subtotal - &totals.discount_amount + &totals.total_tax;
        assert!((line_sum - expected).abs() <= dec("0.01"));

        assert_eq!(&totals.cgst + &totals.sgst, totals.total_tax);
        assert!((&totals.cgst - &totals.sgst).abs() <= dec("0.01"));
    }

    #[test]
    fn test_odd_paisa_goes_to_cgst() {
        let items = vec![LineItemInput::new("Clip", BigDecimal::from(1), dec("0.28"))];
        let totals = calculator().calculate(&items, Some("27ABCDE1234F1Z5")).unwrap();

        assert_eq!(totals.total_tax, dec("0.05"));
        assert_eq!(totals.cgst, dec("0.03"));
        assert_eq!(totals.sgst, dec("0.02"));
        assert_eq!(&totals.cgst + &totals.sgst, totals.total_tax);
        assert_eq!(
            &totals.slabs[0].cgst + &totals.slabs[0].sgst,
            totals.total_tax
        );
    }

    #[test]
    fn test_half_up_rounding() {
        assert_eq!(round_money(&dec("10.005")), dec("10.01"));
        assert_eq!(round_money(&dec("10.004")), dec("10.00"));
    }

    #[test]
    fn test_slab_summary_groups_by_rate() {
        let items = vec![
            LineItemInput::new("A", BigDecimal::from(1), BigDecimal::from(100)),
            LineItemInput::new("B", BigDecimal::from(1), BigDecimal::from(200))
                .tax(BigDecimal::from(5)),
            LineItemInput::new("C", BigDecimal::from(1), BigDecimal::from(300)),
        ];
        let totals = calculator().calculate(&items, None).unwrap();

        assert_eq!(totals.slabs.len(), 2);
        assert_eq!(totals.slabs[0].category, Some(GstCategory::Reduced));
        assert_eq!(totals.slabs[1].category, Some(GstCategory::Higher));
        assert_eq!(totals.slabs[1].taxable_amount, BigDecimal::from(400));
        assert_eq!(totals.slabs[1].cgst, BigDecimal::from(36));
    }

    #[test]
    fn test_invalid_discount_is_rejected() {
        let items = vec![LineItemInput::new("A", BigDecimal::from(1), BigDecimal::from(100))
            .discount(BigDecimal::from(120))];
        assert!(matches!(
            calculator().calculate(&items, None),
            Err(GstError::InvalidLine(_))
        ));
    }
}
