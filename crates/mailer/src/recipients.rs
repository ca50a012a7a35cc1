use faultline_core::{ChannelKind, ChannelTarget};

/// Resolve the recipient list for an alert: the union of email channel
/// targets and explicit overrides, deduplicated case-insensitively while
/// preserving the first occurrence.
///
/// Channel targets may carry several comma-separated addresses.
#[must_use]
pub fn resolve_recipients(channels: &[ChannelTarget], overrides: &[String]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut result: Vec<String> = Vec::new();

    let channel_addresses = channels
        .iter()
        .filter(|c| c.kind == ChannelKind::Email)
        .flat_map(|c| c.target.split(','));

    for address in channel_addresses
        .chain(overrides.iter().map(String::as_str))
        .map(str::trim)
        .filter(|a| !a.is_empty())
    {
        let folded = address.to_lowercase();
        if !seen.contains(&folded) {
            seen.push(folded);
            result.push(address.to_owned());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupes_case_insensitively_keeping_first() {
        let channels = vec![
            ChannelTarget::new(ChannelKind::Email, "Dev@X.test"),
            ChannelTarget::new(ChannelKind::Webhook, "https://h"),
            ChannelTarget::new(ChannelKind::Email, "ops@x.test, dev@x.test"),
        ];
        let overrides = vec!["DEV@x.test".to_owned(), "lead@x.test".to_owned()];

        let recipients = resolve_recipients(&channels, &overrides);
        assert_eq!(recipients, vec!["Dev@X.test", "ops@x.test", "lead@x.test"]);
    }

    #[test]
    fn empty_inputs_resolve_to_empty() {
        assert!(resolve_recipients(&[], &[]).is_empty());
        let blank = vec![ChannelTarget::new(ChannelKind::Email, " , ")];
        assert!(resolve_recipients(&blank, &[]).is_empty());
    }
}
