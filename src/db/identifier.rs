use anyhow::{bail, ensure, Result};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

const IDENTIFIER_LEN: usize = 16;
const MAX_IDENTIFIER_LEN: usize = 64;
const MAX_ATTEMPTS: usize = 30;

/// Identifies an import job. The same identifier keys the job status and the stored download.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    pub fn parse(identifier: &str) -> Result<Self> {
        ensure!(!identifier.is_empty(), "Job identifier is empty");
        ensure!(
            identifier.len() <= MAX_IDENTIFIER_LEN,
            "Job identifier is longer than {MAX_IDENTIFIER_LEN} characters"
        );
        ensure!(
            identifier
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "Job identifier {identifier:?} may only contain letters, digits, '-' and '_'"
        );
        Ok(Self(identifier.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

/// Generate a random job identifier that `is_taken` doesn't know yet.
pub fn generate_identifier(rng: &mut impl Rng, mut is_taken: impl FnMut(&JobId) -> bool) -> Result<JobId> {
    for attempt in 1..=MAX_ATTEMPTS {
        let candidate = JobId(
            (0..IDENTIFIER_LEN)
                .map(|_| char::from(rng.sample(Alphanumeric)))
                .collect(),
        );
        log::debug!("Attempt #{attempt} results in \"{candidate}\"");
        if !is_taken(&candidate) {
            log::info!("Job identifier is \"{candidate}\"");
            return Ok(candidate);
        }
    }
    bail!("Could not find an unused job identifier after {MAX_ATTEMPTS} attempts");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn generates_alphanumeric_identifier() {
        let mut rng = StdRng::seed_from_u64(1);
        let identifier = generate_identifier(&mut rng, |_| false).unwrap();
        assert_eq!(IDENTIFIER_LEN, identifier.as_str().len());
        assert!(identifier.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn retries_on_collision() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut attempts = 0;
        let identifier = generate_identifier(&mut rng, |_| {
            attempts += 1;
            attempts < 3
        })
        .unwrap();
        assert_eq!(3, attempts);
        assert_eq!(IDENTIFIER_LEN, identifier.as_str().len());
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut attempts = 0;
        let result = generate_identifier(&mut rng, |_| {
            attempts += 1;
            true
        });
        assert!(result.is_err());
        assert_eq!(MAX_ATTEMPTS, attempts);
    }

    #[test]
    fn parse_valid() {
        assert_eq!("abc-DEF_123", JobId::parse("abc-DEF_123").unwrap().as_str());
    }

    #[test]
    fn parse_invalid() {
        assert!(JobId::parse("").is_err());
        assert!(JobId::parse("../etc").is_err());
        assert!(JobId::parse(&"a".repeat(65)).is_err());
    }

    #[test]
    fn deserialize_validates() {
        assert!(serde_json::from_str::<JobId>("\"abc\"").is_ok());
        assert!(serde_json::from_str::<JobId>("\"a/b\"").is_err());
    }
}
