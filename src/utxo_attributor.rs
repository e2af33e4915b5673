//! Attribution of batch scan results back to the requested addresses.
//!
//! A multi-descriptor `scantxoutset` returns one flat list of unspent outputs. The only
//! link between an output and the address it belongs to is the output's descriptor text
//! (`addr(<address>)#<checksum>`), so attribution is a containment test on that text.
//!
//! Known limitation: containment is not parsing. When one requested address is a
//! substring of another requested address (or of unrelated descriptor metadata), a record
//! is credited to every address it contains. The behaviour is kept as is and covered by
//! `test_substring_overlap_double_counts`; replacing [`SubstringAttributor`] with a
//! descriptor parser only requires another [`UtxoAttributor`] implementation.

use crate::types::UnspentRecord;
use indexmap::IndexMap;
use rust_decimal::Decimal;

pub trait UtxoAttributor: Send + Sync {
    /// Sums record amounts per requested address. Every requested address is present in
    /// the result; addresses without matching records map to zero.
    fn attribute(&self, addresses: &[String], records: &[UnspentRecord]) -> IndexMap<String, Decimal>;
}

/// Containment-based attribution.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringAttributor;

impl UtxoAttributor for SubstringAttributor {
    fn attribute(&self, addresses: &[String], records: &[UnspentRecord]) -> IndexMap<String, Decimal> {
        let mut balances: IndexMap<String, Decimal> = addresses
            .iter()
            .map(|a| (a.clone(), Decimal::ZERO))
            .collect();

        for record in records {
            for (address, sum) in balances.iter_mut() {
                if record.desc.contains(address.as_str()) {
                    *sum += record.amount;
                }
            }
        }

        balances
    }
}
