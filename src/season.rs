use crate::error::EngineError;

/// Converts a four digit season code (`9394`, `0001`, `2526`) to its starting year.
/// Codes starting at 90 or above belong to the 1900s.
pub fn season_code_to_start_year(code: &str) -> Result<i32, EngineError> {
    let code = code.trim();
    if code.len() != 4 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EngineError::InvalidSeasonCode(code.to_string()));
    }
    let first_two: i32 = code[..2]
        .parse()
        .map_err(|_| EngineError::InvalidSeasonCode(code.to_string()))?;
    if first_two >= 90 {
        Ok(1900 + first_two)
    } else {
        Ok(2000 + first_two)
    }
}

pub fn season_code_to_label(code: &str) -> Result<String, EngineError> {
    let start = season_code_to_start_year(code)?;
    let end = (start + 1) % 100;
    Ok(format!("{start}/{end:02}"))
}
