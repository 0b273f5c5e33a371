//! Canonicalization and grouping of diagnostic-context (MDC) pairs.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use loglens_types::{LogEntry, Mdc, mdc_value_to_string};

use crate::dc_filter::DcFilter;

/// Folded spelling to canonical name for well-known keys
const CANONICAL_KEYS: &[(&str, &str)] = &[
    ("traceid", "traceId"),
    ("xb3traceid", "traceId"),
    ("spanid", "spanId"),
    ("xb3spanid", "spanId"),
    ("requestid", "requestId"),
    ("reqid", "requestId"),
    ("xrequestid", "requestId"),
    ("correlationid", "correlationId"),
    ("corrid", "correlationId"),
    ("xcorrelationid", "correlationId"),
    ("userid", "userId"),
    ("sessionid", "sessionId"),
    ("tenantid", "tenantId"),
    ("tenant", "tenantId"),
    ("clientip", "clientIp"),
    ("remoteip", "clientIp"),
    ("remoteaddr", "clientIp"),
];

/// Map the many spellings of a logical key (`trace_id`, `X-B3-TraceId`,
/// `trace.id`) onto one name. Unknown keys come back trimmed.
pub fn canonical_mdc_key(key: &str) -> Cow<'_, str> {
    let key = key.trim();
    let folded: String = key
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | '.' | ' '))
        .flat_map(char::to_lowercase)
        .collect();

    CANONICAL_KEYS
        .iter()
        .find(|(spelling, _)| *spelling == folded)
        .map(|(_, canonical)| Cow::Borrowed(*canonical))
        .unwrap_or(Cow::Borrowed(key))
}

/// Display pairs for one entry: values grouped per canonical key, sorted,
/// de-duplicated and joined with `|`. Sorted by key.
pub fn entry_mdc_pairs(mdc: Option<&Mdc>) -> Vec<(String, String)> {
    let mut grouped: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (key, value) in mdc.into_iter().flatten() {
        let value = mdc_value_to_string(value);
        if value.is_empty() {
            continue;
        }
        grouped
            .entry(canonical_mdc_key(key).into_owned())
            .or_default()
            .insert(value);
    }

    grouped
        .into_iter()
        .map(|(key, values)| (key, values.into_iter().collect::<Vec<_>>().join("|")))
        .collect()
}

/// One distinct value of a key across a selection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MdcValueCount {
    pub value: String,
    pub count: usize,
}

/// All values seen for one canonical key across a multi-entry selection
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MdcKeyGroup {
    pub key: String,
    pub values: Vec<MdcValueCount>,
}

impl MdcKeyGroup {
    /// Total occurrences of this key across the selection
    pub fn occurrences(&self) -> usize {
        self.values.iter().map(|v| v.count).sum()
    }

    /// Filter on the key being present with any value
    pub fn add_key_to(&self, filter: &mut DcFilter) {
        filter.add_entry(&self.key, None);
    }

    /// Filter on any of the observed values
    pub fn add_all_values_to(&self, filter: &mut DcFilter) {
        for value in &self.values {
            filter.add_entry(&self.key, Some(&value.value));
        }
    }

    /// Filter on a chosen subset of the observed values; unknown values are ignored
    pub fn add_selected_values_to(&self, filter: &mut DcFilter, selected: &[&str]) {
        for value in self.values.iter().filter(|v| selected.contains(&v.value.as_str())) {
            filter.add_entry(&self.key, Some(&value.value));
        }
    }
}

/// Aggregate the raw MDC values of several entries per canonical key
pub fn aggregate_selection<'a, I>(entries: I) -> Vec<MdcKeyGroup>
where
    I: IntoIterator<Item = &'a LogEntry>,
{
    let mut counts: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for entry in entries {
        for (key, value) in entry.mdc.iter().flatten() {
            let value = mdc_value_to_string(value);
            if value.is_empty() {
                continue;
            }
            *counts
                .entry(canonical_mdc_key(key).into_owned())
                .or_default()
                .entry(value)
                .or_default() += 1;
        }
    }

    counts
        .into_iter()
        .map(|(key, values)| MdcKeyGroup {
            key,
            values: values
                .into_iter()
                .map(|(value, count)| MdcValueCount { value, count })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_keys() {
        assert_eq!(canonical_mdc_key("trace_id"), "traceId");
        assert_eq!(canonical_mdc_key("X-B3-TraceId"), "traceId");
        assert_eq!(canonical_mdc_key("trace.id"), "traceId");
        assert_eq!(canonical_mdc_key("REQUEST_ID"), "requestId");
        assert_eq!(canonical_mdc_key(" orderId "), "orderId");
    }

    #[test]
    fn test_entry_pairs_group_variant_keys() {
        let entry = LogEntry::default()
            .with_mdc("trace_id", "b")
            .with_mdc("traceId", "a")
            .with_mdc("TraceId", "a")
            .with_mdc("orderId", 42)
            .with_mdc("empty", "");

        assert_eq!(
            entry_mdc_pairs(entry.mdc.as_ref()),
            vec![
                ("orderId".to_string(), "42".to_string()),
                ("traceId".to_string(), "a|b".to_string()),
            ]
        );
    }

    #[test]
    fn test_entry_pairs_without_mdc() {
        assert!(entry_mdc_pairs(None).is_empty());
    }

    #[test]
    fn test_aggregate_selection_counts() {
        let entries = [
            LogEntry::default().with_mdc("traceId", "a").with_mdc("user_id", "u1"),
            LogEntry::default().with_mdc("trace_id", "a"),
            LogEntry::default().with_mdc("traceId", "b"),
        ];
        let groups = aggregate_selection(entries.iter());

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "traceId");
        assert_eq!(
            groups[0].values,
            vec![
                MdcValueCount { value: "a".into(), count: 2 },
                MdcValueCount { value: "b".into(), count: 1 },
            ]
        );
        assert_eq!(groups[0].occurrences(), 3);
        assert_eq!(groups[1].key, "userId");
    }

    #[test]
    fn test_bulk_filter_actions() {
        let entries = [
            LogEntry::default().with_mdc("traceId", "a"),
            LogEntry::default().with_mdc("traceId", "b"),
            LogEntry::default().with_mdc("traceId", "c"),
        ];
        let group = &aggregate_selection(entries.iter())[0];

        let mut filter = DcFilter::new();
        group.add_selected_values_to(&mut filter, &["a", "c", "zzz"]);
        let values: Vec<_> = filter.entries().iter().map(|e| e.value.clone()).collect();
        assert_eq!(values, vec![Some("a".to_string()), Some("c".to_string())]);

        let mut filter = DcFilter::new();
        group.add_all_values_to(&mut filter);
        assert_eq!(filter.entries().len(), 3);

        let mut filter = DcFilter::new();
        group.add_key_to(&mut filter);
        assert_eq!(filter.entries()[0].value, None);
    }
}
