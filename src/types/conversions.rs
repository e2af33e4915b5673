use rust_decimal::Decimal;
use serde_json::Number;
use std::str::FromStr;

/// Subunits (satoshis) per whole coin.
pub const SUBUNITS_PER_COIN: i64 = 100_000_000;

/// Scale of a subunit amount when expressed in whole coins (10^8).
const SUBUNIT_SCALE: u32 = 8;

// Explorers report balances in satoshis; the monitor stores whole coins.
pub fn subunits_to_coin(subunits: i64) -> Result<Decimal, ConversionError> {
    if subunits < 0 {
        return Err(ConversionError::Negative(subunits.to_string()));
    }
    Ok(Decimal::new(subunits, SUBUNIT_SCALE))
}

// Bitcoin Core prints amounts as JSON floats with up to 8 decimals. Going through the
// textual form keeps 0.1 as 0.1 instead of the nearest f64.
pub fn json_number_to_decimal(value: &Number) -> Result<Decimal, ConversionError> {
    let text = value.to_string();
    let decimal = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| ConversionError::InvalidDecimal(format!("{text}: {e}")))?;
    if decimal.is_sign_negative() && !decimal.is_zero() {
        return Err(ConversionError::Negative(text));
    }
    Ok(decimal.normalize())
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Invalid decimal: {0}")]
    InvalidDecimal(String),
    #[error("Negative amount: {0}")]
    Negative(String),
}
