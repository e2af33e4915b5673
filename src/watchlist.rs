//! Operator input for the watch-list.
//!
//! One entry per line, either `Address` or `Label,Address`. The address is the last
//! comma-separated field; everything before it is the label, so labels may contain commas.

use crate::types::NewAddress;

pub const DEFAULT_LABEL: &str = "Unlabeled";

/// Parses free-form watch-list text. Blank lines and entries without an address are skipped.
pub fn parse_watchlist_input(input: &str) -> Vec<NewAddress> {
    input.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<NewAddress> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (label, address) = match line.rsplit_once(',') {
        Some((label, address)) => {
            let label = label.trim();
            let label = if label.is_empty() { DEFAULT_LABEL } else { label };
            (label, address.trim())
        }
        None => (DEFAULT_LABEL, line),
    };

    if address.is_empty() {
        return None;
    }

    Some(NewAddress {
        label: label.to_string(),
        address: address.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, address: &str) -> NewAddress {
        NewAddress {
            label: label.to_string(),
            address: address.to_string(),
        }
    }

    #[test]
    fn test_labeled_and_bare_lines() {
        let parsed = parse_watchlist_input(
            "Exchange,1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa\n\
             Savings, 1JTK7s9YVYywfm5XUH7RNhHJH1LshCaRFR \n\
             1PWo3JeB9jrGwfHDNpdGK54CRas7fsBzXU",
        );
        assert_eq!(
            parsed,
            vec![
                entry("Exchange", "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"),
                entry("Savings", "1JTK7s9YVYywfm5XUH7RNhHJH1LshCaRFR"),
                entry(DEFAULT_LABEL, "1PWo3JeB9jrGwfHDNpdGK54CRas7fsBzXU"),
            ]
        );
    }

    #[test]
    fn test_label_may_contain_commas() {
        let parsed = parse_watchlist_input("Cold storage, vault 2,bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh");
        assert_eq!(
            parsed,
            vec![entry("Cold storage, vault 2", "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh")]
        );
    }

    #[test]
    fn test_blank_and_empty_address_lines_skipped() {
        let parsed = parse_watchlist_input("\r\n   \nLabel only,\n,1abc\r\n\n");
        assert_eq!(parsed, vec![entry(DEFAULT_LABEL, "1abc")]);
    }
}
