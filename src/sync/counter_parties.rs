use std::collections::BTreeSet;

use crate::db::Download;

/// Distinct mapping keys of everyone on the other side of a downloaded payment
pub fn counter_parties(download: &Download) -> Vec<String> {
    download
        .values()
        .flatten()
        .map(|payment| payment.counter_party.mapping_key())
        .filter(|key| !key.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
