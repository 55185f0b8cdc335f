use thiserror::Error;

pub const MIN_SELL_COUNT: u32 = 1;
pub const MAX_SELL_COUNT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub credential: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("missing ':' separator")]
    MissingSeparator,
    #[error("credential or secret is empty")]
    EmptyField,
}

/// A line-oriented `credential:secret` batch. Blank lines are ignored;
/// malformed lines are kept verbatim so they can be reported back.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParsedBatch {
    pub pairs: Vec<CredentialPair>,
    pub malformed: Vec<String>,
}

impl ParsedBatch {
    /// Accepted pairs as `(credential, secret)` tuples for the store.
    pub fn credential_pairs(&self) -> Vec<(String, String)> {
        self.pairs
            .iter()
            .map(|p| (p.credential.clone(), p.secret.clone()))
            .collect()
    }
}

/// Split on the first `:` so secrets may themselves contain colons.
pub fn parse_credential_line(line: &str) -> Result<CredentialPair, LineError> {
    let (credential, secret) = line.split_once(':').ok_or(LineError::MissingSeparator)?;
    let (credential, secret) = (credential.trim(), secret.trim());
    if credential.is_empty() || secret.is_empty() {
        return Err(LineError::EmptyField);
    }
    Ok(CredentialPair {
        credential: credential.to_string(),
        secret: secret.to_string(),
    })
}

pub fn parse_credential_lines(input: &str) -> ParsedBatch {
    let mut batch = ParsedBatch::default();
    for line in input.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_credential_line(line) {
            Ok(pair) => batch.pairs.push(pair),
            Err(_) => batch.malformed.push(line.to_string()),
        }
    }
    batch
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CountError {
    #[error("please enter a whole number")]
    NotANumber,
    #[error("the number must be between 1 and 5")]
    OutOfRange,
}

pub fn parse_sell_count(input: &str) -> Result<u32, CountError> {
    let n: i64 = input.trim().parse().map_err(|_| CountError::NotANumber)?;
    if !(MIN_SELL_COUNT as i64..=MAX_SELL_COUNT as i64).contains(&n) {
        return Err(CountError::OutOfRange);
    }
    Ok(n as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("please enter a whole number")]
    NotANumber,
    #[error("the amount must be greater than zero")]
    NotPositive,
    #[error("the amount may not exceed {0}")]
    AboveLimit(i64),
}

/// Credit typed by the admin on approval. Any positive integer is accepted
/// unless a ceiling is configured.
pub fn parse_credit_amount(input: &str, max: Option<i64>) -> Result<i64, AmountError> {
    let amount: i64 = input.trim().parse().map_err(|_| AmountError::NotANumber)?;
    if amount <= 0 {
        return Err(AmountError::NotPositive);
    }
    match max {
        Some(max) if amount > max => Err(AmountError::AboveLimit(max)),
        _ => Ok(amount),
    }
}
