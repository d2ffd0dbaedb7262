use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one extracted bill field.
///
/// Variants are declared in schema order, so the derived `Ord` iterates maps
/// keyed by `FieldId` in the same order the schema lists them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldId {
    ConsumerName,
    ConsumerNumber,
    MeterNumber,
    BillingPeriod,
    PreviousReadingDate,
    CurrentReadingDate,
    UnitsConsumed,
    BillAmount,
    DueDate,
    Address,
    Discom,
}

impl FieldId {
    pub const ALL: [FieldId; 11] = [
        FieldId::ConsumerName,
        FieldId::ConsumerNumber,
        FieldId::MeterNumber,
        FieldId::BillingPeriod,
        FieldId::PreviousReadingDate,
        FieldId::CurrentReadingDate,
        FieldId::UnitsConsumed,
        FieldId::BillAmount,
        FieldId::DueDate,
        FieldId::Address,
        FieldId::Discom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldId::ConsumerName => "consumer_name",
            FieldId::ConsumerNumber => "consumer_number",
            FieldId::MeterNumber => "meter_number",
            FieldId::BillingPeriod => "billing_period",
            FieldId::PreviousReadingDate => "previous_reading_date",
            FieldId::CurrentReadingDate => "current_reading_date",
            FieldId::UnitsConsumed => "units_consumed",
            FieldId::BillAmount => "bill_amount",
            FieldId::DueDate => "due_date",
            FieldId::Address => "address",
            FieldId::Discom => "discom",
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("Unknown field id: '{s}'"))
    }
}

/// One schema entry: the field and the description given to the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub id: FieldId,
    pub description: &'static str,
}

/// The ordered set of fields extracted from every bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    fields: Vec<FieldSpec>,
}

impl FieldSchema {
    /// The fixed 11-field schema for Indian electricity bills.
    pub fn electricity_bill() -> Self {
        let spec = |id, description| FieldSpec { id, description };
        Self {
            fields: vec![
                spec(FieldId::ConsumerName, "Full name of the consumer"),
                spec(FieldId::ConsumerNumber, "Consumer/account number (alphanumeric)"),
                spec(FieldId::MeterNumber, "Electricity meter number"),
                spec(FieldId::BillingPeriod, "Billing period (date range)"),
                spec(FieldId::PreviousReadingDate, "Previous meter reading date"),
                spec(FieldId::CurrentReadingDate, "Current meter reading date"),
                spec(FieldId::UnitsConsumed, "Total units consumed (number)"),
                spec(FieldId::BillAmount, "Total bill amount (number, without currency symbol)"),
                spec(FieldId::DueDate, "Payment due date"),
                spec(FieldId::Address, "Consumer address"),
                spec(FieldId::Discom, "Distribution company name"),
            ],
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.fields.iter().map(|f| f.id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, id: FieldId) -> bool {
        self.fields.iter().any(|f| f.id == id)
    }

    pub fn description(&self, id: FieldId) -> Option<&'static str> {
        self.fields.iter().find(|f| f.id == id).map(|f| f.description)
    }
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self::electricity_bill()
    }
}
