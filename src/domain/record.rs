//! ProcessRecord — one process on one machine, as reported in a snapshot.
//!
//! Publishers emit psutil-style field names (`get_cpu_percent`, ...). Both the
//! prefixed and plain names are accepted. Every field is required: a record
//! that lacks one fails to decode instead of being padded with defaults.

use serde::{Deserialize, Deserializer, Serialize};

/// Bytes per MiB, used by the memory tooltip.
pub const MIB: f64 = 1_048_576.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRecord {
    #[serde(alias = "name")]
    pub node_name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub pid: String,
    #[serde(alias = "get_cpu_percent")]
    pub cpu_percent: f64,
    #[serde(alias = "get_memory_percent")]
    pub memory_percent: f64,
    #[serde(alias = "get_num_threads", deserialize_with = "string_or_number")]
    pub num_threads: String,
    pub cmdline: Vec<String>,
    pub memory_info: MemoryInfo,
}

impl ProcessRecord {
    /// Decode a JSON-encoded list of records, as carried in an ingestion message value.
    pub fn decode_list(value: &str) -> serde_json::Result<Vec<Self>> {
        serde_json::from_str(value)
    }
}

/// Resident and virtual memory in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMemoryInfo")]
pub struct MemoryInfo {
    pub rss: f64,
    pub vms: f64,
}

impl MemoryInfo {
    pub fn resident_mib(&self) -> f64 {
        self.rss / MIB
    }

    pub fn virtual_mib(&self) -> f64 {
        self.vms / MIB
    }
}

/// psutil serializes `memory_info` as a positional tuple (`[rss, vms, ...]`);
/// an object with named fields is accepted as well.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawMemoryInfo {
    Tuple(Vec<f64>),
    Named { rss: f64, vms: f64 },
}

impl TryFrom<RawMemoryInfo> for MemoryInfo {
    type Error = String;

    fn try_from(raw: RawMemoryInfo) -> Result<Self, Self::Error> {
        match raw {
            RawMemoryInfo::Tuple(values) => match values.as_slice() {
                [rss, vms, ..] => Ok(Self {
                    rss: *rss,
                    vms: *vms,
                }),
                _ => Err(format!(
                    "memory_info needs at least 2 values (resident, virtual), got {}",
                    values.len()
                )),
            },
            RawMemoryInfo::Named { rss, vms } => Ok(Self { rss, vms }),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Integer(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(node_name: &str, cpu: f64) -> ProcessRecord {
        ProcessRecord {
            node_name: node_name.to_string(),
            pid: "100".to_string(),
            cpu_percent: cpu,
            memory_percent: 1.0,
            num_threads: "4".to_string(),
            cmdline: vec!["/usr/bin/".to_string() + node_name],
            memory_info: MemoryInfo {
                rss: MIB * 10.0,
                vms: MIB * 20.0,
            },
        }
    }

    #[test]
    fn decodes_psutil_field_names() {
        let value = r#"[{
            "node_name": "/talker",
            "pid": 4242,
            "get_cpu_percent": 12.5,
            "get_memory_percent": 0.75,
            "get_num_threads": 7,
            "cmdline": ["python", "talker.py"],
            "memory_info": [1048576, 2097152, 0, 0]
        }]"#;

        let records = ProcessRecord::decode_list(value).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.node_name, "/talker");
        assert_eq!(r.pid, "4242");
        assert_eq!(r.cpu_percent, 12.5);
        assert_eq!(r.num_threads, "7");
        assert_eq!(r.memory_info.resident_mib(), 1.0);
        assert_eq!(r.memory_info.virtual_mib(), 2.0);
    }

    #[test]
    fn decodes_plain_names_and_string_values() {
        let value = r#"[{
            "node_name": "n",
            "pid": "42",
            "cpu_percent": 1.0,
            "memory_percent": 2.0,
            "num_threads": "3",
            "cmdline": [],
            "memory_info": {"rss": 10, "vms": 20}
        }]"#;

        let records = ProcessRecord::decode_list(value).unwrap();
        assert_eq!(records[0].pid, "42");
        assert_eq!(records[0].num_threads, "3");
        assert_eq!(records[0].memory_info.rss, 10.0);
    }

    #[test]
    fn rejects_missing_field() {
        let value = r#"[{
            "node_name": "n",
            "pid": 1,
            "get_cpu_percent": 1.0,
            "get_num_threads": 3,
            "cmdline": [],
            "memory_info": [1, 2]
        }]"#;

        let err = ProcessRecord::decode_list(value).unwrap_err();
        assert!(err.to_string().contains("memory_percent"), "{}", err);
    }

    #[test]
    fn rejects_short_memory_info() {
        let value = r#"[{
            "node_name": "n",
            "pid": 1,
            "get_cpu_percent": 1.0,
            "get_memory_percent": 1.0,
            "get_num_threads": 3,
            "cmdline": [],
            "memory_info": [1]
        }]"#;

        assert!(ProcessRecord::decode_list(value).is_err());
    }
}
