//! Unit conversion between display units and the base unit stock is stored in.
//!
//! Every inventory quantity is persisted in its dimension's base unit (grams,
//! milliliters or pieces) and every cost as cost per base unit. Large units
//! (kilogram, liter) are 1000 base units; everything else converts 1:1.
//!
//! Quantities and costs convert in opposite directions:
//!
//! ```text
//! 5 kg          -> 5000 g        (quantity × 1000)
//! 12000 / kg    -> 12 / g        (cost ÷ 1000)
//! ```

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bakeops_core::{DomainError, ValueObject};

/// A unit a user can enter or see.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "g")]
    Gram,
    #[serde(rename = "l")]
    Liter,
    #[serde(rename = "ml")]
    Milliliter,
    #[serde(rename = "pcs")]
    Piece,
    #[serde(rename = "pair")]
    Pair,
}

/// Closed classification of units by their relation to the base unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum UnitKind {
    MassLarge,
    MassSmall,
    VolumeLarge,
    VolumeSmall,
    Count,
}

/// Physical dimension; conversions are only defined within one dimension.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Mass,
    Volume,
    Count,
}

impl ValueObject for Unit {}

impl Unit {
    pub const ALL: [Unit; 6] = [
        Unit::Kilogram,
        Unit::Gram,
        Unit::Liter,
        Unit::Milliliter,
        Unit::Piece,
        Unit::Pair,
    ];

    pub fn kind(self) -> UnitKind {
        match self {
            Unit::Kilogram => UnitKind::MassLarge,
            Unit::Gram => UnitKind::MassSmall,
            Unit::Liter => UnitKind::VolumeLarge,
            Unit::Milliliter => UnitKind::VolumeSmall,
            Unit::Piece | Unit::Pair => UnitKind::Count,
        }
    }

    pub fn dimension(self) -> Dimension {
        self.kind().dimension()
    }

    /// Number of base units in one of this unit.
    pub fn factor(self) -> Decimal {
        self.kind().factor()
    }

    /// The unit values of this dimension are stored in.
    ///
    /// Count units are their own base: a pair item is counted in pairs.
    pub fn base_unit(self) -> Unit {
        match self {
            Unit::Kilogram | Unit::Gram => Unit::Gram,
            Unit::Liter | Unit::Milliliter => Unit::Milliliter,
            Unit::Piece => Unit::Piece,
            Unit::Pair => Unit::Pair,
        }
    }

    pub fn is_large(self) -> bool {
        matches!(self.kind(), UnitKind::MassLarge | UnitKind::VolumeLarge)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Kilogram => "kg",
            Unit::Gram => "g",
            Unit::Liter => "l",
            Unit::Milliliter => "ml",
            Unit::Piece => "pcs",
            Unit::Pair => "pair",
        }
    }

    /// Parse a unit code, returning `None` for anything unrecognized.
    pub fn parse(code: &str) -> Option<Unit> {
        match code.trim().to_ascii_lowercase().as_str() {
            "kg" | "kgs" | "kilogram" | "kilograms" => Some(Unit::Kilogram),
            "g" | "gr" | "gram" | "grams" => Some(Unit::Gram),
            "l" | "lt" | "liter" | "liters" | "litre" | "litres" => Some(Unit::Liter),
            "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => {
                Some(Unit::Milliliter)
            }
            "pcs" | "pc" | "piece" | "pieces" => Some(Unit::Piece),
            "pair" | "pairs" => Some(Unit::Pair),
            _ => None,
        }
    }
}

impl UnitKind {
    pub fn dimension(self) -> Dimension {
        match self {
            UnitKind::MassLarge | UnitKind::MassSmall => Dimension::Mass,
            UnitKind::VolumeLarge | UnitKind::VolumeSmall => Dimension::Volume,
            UnitKind::Count => Dimension::Count,
        }
    }

    pub fn factor(self) -> Decimal {
        match self {
            UnitKind::MassLarge | UnitKind::VolumeLarge => Decimal::ONE_THOUSAND,
            UnitKind::MassSmall | UnitKind::VolumeSmall | UnitKind::Count => Decimal::ONE,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Unit {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::parse(s).ok_or_else(|| DomainError::validation(format!("unknown unit '{s}'")))
    }
}

/// Display quantity -> base quantity.
pub fn to_base_unit(quantity: Decimal, unit: Unit) -> Decimal {
    quantity * unit.factor()
}

/// [`to_base_unit`] for untrusted input: a result beyond the decimal range is a
/// validation error instead of a panic.
pub fn checked_to_base_unit(quantity: Decimal, unit: Unit) -> Result<Decimal, DomainError> {
    quantity
        .checked_mul(unit.factor())
        .ok_or_else(|| DomainError::validation(format!("{quantity} {unit} is out of range")))
}

/// Base quantity -> display quantity.
pub fn from_base_unit(base_quantity: Decimal, unit: Unit) -> Decimal {
    base_quantity / unit.factor()
}

/// Cost per display unit -> cost per base unit.
pub fn normalize_cost(display_cost: Decimal, unit: Unit) -> Decimal {
    display_cost / unit.factor()
}

/// Cost per base unit -> cost per display unit.
pub fn denormalize_cost(base_cost: Decimal, unit: Unit) -> Decimal {
    base_cost.saturating_mul(unit.factor())
}

/// Convert a quantity between two units of the same dimension.
pub fn convert(quantity: Decimal, from: Unit, to: Unit) -> Result<Decimal, DomainError> {
    if from.dimension() != to.dimension() {
        return Err(DomainError::validation(format!(
            "cannot convert {from} to {to}: different dimensions"
        )));
    }
    Ok(from_base_unit(to_base_unit(quantity, from), to))
}

fn lenient(code: &str, value: Decimal, op: fn(Decimal, Unit) -> Decimal) -> Decimal {
    match Unit::parse(code) {
        Some(unit) => op(value, unit),
        None => {
            tracing::warn!(unit = code, "unrecognized unit; passing value through unconverted");
            value
        }
    }
}

/// [`to_base_unit`] for raw unit strings; unrecognized units convert as identity.
pub fn to_base_unit_lenient(quantity: Decimal, unit: &str) -> Decimal {
    lenient(unit, quantity, to_base_unit)
}

/// [`from_base_unit`] for raw unit strings; unrecognized units convert as identity.
pub fn from_base_unit_lenient(base_quantity: Decimal, unit: &str) -> Decimal {
    lenient(unit, base_quantity, from_base_unit)
}

/// [`normalize_cost`] for raw unit strings; unrecognized units convert as identity.
pub fn normalize_cost_lenient(display_cost: Decimal, unit: &str) -> Decimal {
    lenient(unit, display_cost, normalize_cost)
}

/// [`denormalize_cost`] for raw unit strings; unrecognized units convert as identity.
pub fn denormalize_cost_lenient(base_cost: Decimal, unit: &str) -> Decimal {
    lenient(unit, base_cost, denormalize_cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn checked_conversion_rejects_overflow() {
        assert_eq!(checked_to_base_unit(dec!(5), Unit::Kilogram).unwrap(), dec!(5000));
        assert_eq!(checked_to_base_unit(Decimal::MAX, Unit::Gram).unwrap(), Decimal::MAX);
        let err = checked_to_base_unit(Decimal::MAX, Unit::Kilogram).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn kilograms_scale_quantity_up_and_cost_down() {
        assert_eq!(to_base_unit(dec!(5), Unit::Kilogram), dec!(5000));
        assert_eq!(normalize_cost(dec!(12000), Unit::Kilogram), dec!(12));
        assert_eq!(from_base_unit(dec!(5000), Unit::Kilogram), dec!(5));
        assert_eq!(denormalize_cost(dec!(12), Unit::Kilogram), dec!(12000));
    }

    #[test]
    fn liters_behave_like_kilograms() {
        assert_eq!(to_base_unit(dec!(1.5), Unit::Liter), dec!(1500));
        assert_eq!(normalize_cost(dec!(3000), Unit::Liter), dec!(3));
    }

    #[test]
    fn base_units_are_identity() {
        for unit in [Unit::Gram, Unit::Milliliter, Unit::Piece, Unit::Pair] {
            assert_eq!(to_base_unit(dec!(42.5), unit), dec!(42.5));
            assert_eq!(from_base_unit(dec!(42.5), unit), dec!(42.5));
            assert_eq!(normalize_cost(dec!(7), unit), dec!(7));
            assert_eq!(denormalize_cost(dec!(7), unit), dec!(7));
        }
    }

    #[test]
    fn base_unit_and_kind_tables() {
        assert_eq!(Unit::Kilogram.base_unit(), Unit::Gram);
        assert_eq!(Unit::Liter.base_unit(), Unit::Milliliter);
        assert_eq!(Unit::Pair.base_unit(), Unit::Pair);
        assert_eq!(Unit::Kilogram.kind(), UnitKind::MassLarge);
        assert_eq!(Unit::Milliliter.kind(), UnitKind::VolumeSmall);
        assert_eq!(Unit::Pair.dimension(), Dimension::Count);
        assert!(Unit::Liter.is_large());
        assert!(!Unit::Piece.is_large());
    }

    #[test]
    fn parse_accepts_symbols_and_aliases() {
        assert_eq!("KG".parse::<Unit>().unwrap(), Unit::Kilogram);
        assert_eq!(" litre ".parse::<Unit>().unwrap(), Unit::Liter);
        assert_eq!("pcs".parse::<Unit>().unwrap(), Unit::Piece);
        assert!(matches!(
            "bushel".parse::<Unit>(),
            Err(DomainError::Validation(_))
        ));
        for unit in Unit::ALL {
            assert_eq!(unit.symbol().parse::<Unit>().unwrap(), unit);
        }
    }

    #[test]
    fn serde_uses_unit_symbols() {
        assert_eq!(serde_json::to_string(&Unit::Kilogram).unwrap(), "\"kg\"");
        let unit: Unit = serde_json::from_str("\"pair\"").unwrap();
        assert_eq!(unit, Unit::Pair);
    }

    #[test]
    fn convert_within_dimension() {
        assert_eq!(convert(dec!(250), Unit::Gram, Unit::Kilogram).unwrap(), dec!(0.25));
        assert_eq!(convert(dec!(2), Unit::Liter, Unit::Milliliter).unwrap(), dec!(2000));
        assert!(convert(dec!(1), Unit::Kilogram, Unit::Liter).is_err());
    }

    #[test]
    fn unrecognized_units_fall_back_to_identity() {
        assert_eq!(to_base_unit_lenient(dec!(3), "bushel"), dec!(3));
        assert_eq!(from_base_unit_lenient(dec!(3), "bushel"), dec!(3));
        assert_eq!(normalize_cost_lenient(dec!(3), ""), dec!(3));
        assert_eq!(denormalize_cost_lenient(dec!(3), "tray"), dec!(3));
        assert_eq!(to_base_unit_lenient(dec!(3), "kg"), dec!(3000));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_unit() -> impl Strategy<Value = Unit> {
            prop::sample::select(Unit::ALL.to_vec())
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 512,
                ..ProptestConfig::default()
            })]

            /// Property: quantities survive a display -> base -> display trip.
            #[test]
            fn quantity_round_trip(raw in 0i64..1_000_000_000i64, scale in 0u32..4, unit in any_unit()) {
                let q = Decimal::new(raw, scale);
                prop_assert_eq!(from_base_unit(to_base_unit(q, unit), unit), q);
                prop_assert_eq!(to_base_unit(from_base_unit(q, unit), unit), q);
            }

            /// Property: costs survive a normalize -> denormalize trip.
            #[test]
            fn cost_round_trip(raw in 0i64..1_000_000_000i64, scale in 0u32..4, unit in any_unit()) {
                let c = Decimal::new(raw, scale);
                prop_assert_eq!(denormalize_cost(normalize_cost(c, unit), unit), c);
            }

            /// Property: quantity × cost is unit-independent (value is preserved).
            #[test]
            fn stock_value_is_unit_independent(q in 0i64..100_000i64, c in 0i64..100_000i64, unit in any_unit()) {
                let q = Decimal::new(q, 2);
                let c = Decimal::new(c, 2);
                let base_value = to_base_unit(q, unit) * normalize_cost(c, unit);
                prop_assert_eq!(base_value.normalize(), (q * c).normalize());
            }
        }
    }
}
