use std::fmt;

/// Logical tables, named after their canonical storage anchors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Watcher,
    Trigger,
    Execution,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Watcher => "k8s_event_watcher",
            Table::Trigger => "auto_remediation_trigger",
            Table::Execution => "intercepted_event_execution",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key encoder for storage keys
///
/// Ids are zero-padded so that a prefix scan returns rows in id order.
pub struct KeyEncoder;

impl KeyEncoder {
    /// Encode a row key: {table}/{id}
    pub fn encode_record_key(table: Table, id: u64) -> String {
        format!("{}/{:020}", table, id)
    }

    /// Encode a prefix for scanning every row of a table
    pub fn encode_table_prefix(table: Table) -> String {
        format!("{}/", table)
    }

    /// Encode the id sequence key of a table
    pub fn encode_sequence_key(table: Table) -> String {
        format!("sequence/{}", table)
    }

    /// Parse the id out of a row or index key
    pub fn parse_id(key: &str) -> Option<u64> {
        key.rsplit('/').next()?.parse().ok()
    }
}

/// Index key types for secondary indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexKey {
    /// Triggers of a watcher: index/auto_remediation_trigger/watcher/{watcher_id}/{trigger_id}
    TriggerByWatcher { watcher_id: u64, trigger_id: u64 },
}

impl IndexKey {
    /// Encode the index key to a string
    pub fn encode(&self) -> String {
        match self {
            IndexKey::TriggerByWatcher {
                watcher_id,
                trigger_id,
            } => format!(
                "{}{:020}",
                Self::encode_prefix_for_watcher(*watcher_id),
                trigger_id
            ),
        }
    }

    /// Encode a prefix for scanning the triggers of one watcher
    pub fn encode_prefix_for_watcher(watcher_id: u64) -> String {
        format!("index/{}/watcher/{:020}/", Table::Trigger, watcher_id)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}
