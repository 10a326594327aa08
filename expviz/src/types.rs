//! Data types sent to viewers over WebSocket.
//! Keep this module minimal and stable — it defines the wire format.

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Number of GC pause samples kept by the monitored runtime (circular buffer).
pub const PAUSE_SLOTS: usize = 256;

/// One point-in-time read of the monitored process's published variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub time: DateTime<Utc>,
    pub cmdline: Vec<String>,
    pub memstats: MemStats,
    pub numbers: BTreeMap<String, f64>,
    pub number_maps: BTreeMap<String, BTreeMap<String, f64>>,
    pub strings: BTreeMap<String, String>,
    pub string_maps: BTreeMap<String, BTreeMap<String, String>>,
}

impl Snapshot {
    /// Empty snapshot taken at `time`; decoding fills it in.
    pub fn empty(time: DateTime<Utc>) -> Self {
        Self {
            time,
            cmdline: Vec::new(),
            memstats: MemStats::default(),
            numbers: BTreeMap::new(),
            number_maps: BTreeMap::new(),
            strings: BTreeMap::new(),
            string_maps: BTreeMap::new(),
        }
    }
}

/// Runtime allocator and GC counters, field names as published upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemStats {
    // general
    #[serde(rename = "Alloc")]
    pub alloc: u64,
    #[serde(rename = "TotalAlloc")]
    pub total_alloc: u64,
    #[serde(rename = "Sys")]
    pub sys: u64,
    #[serde(rename = "Lookups")]
    pub lookups: u64,
    #[serde(rename = "Mallocs")]
    pub mallocs: u64,
    #[serde(rename = "Frees")]
    pub frees: u64,

    // heap
    #[serde(rename = "HeapAlloc")]
    pub heap_alloc: u64,
    #[serde(rename = "HeapSys")]
    pub heap_sys: u64,
    #[serde(rename = "HeapIdle")]
    pub heap_idle: u64,
    #[serde(rename = "HeapInuse")]
    pub heap_inuse: u64,
    #[serde(rename = "HeapReleased")]
    pub heap_released: u64,
    #[serde(rename = "HeapObjects")]
    pub heap_objects: u64,

    // off-heap allocator structures
    #[serde(rename = "StackInuse")]
    pub stack_inuse: u64,
    #[serde(rename = "StackSys")]
    pub stack_sys: u64,
    #[serde(rename = "MSpanInuse")]
    pub mspan_inuse: u64,
    #[serde(rename = "MSpanSys")]
    pub mspan_sys: u64,
    #[serde(rename = "MCacheInuse")]
    pub mcache_inuse: u64,
    #[serde(rename = "MCacheSys")]
    pub mcache_sys: u64,
    #[serde(rename = "BuckHashSys")]
    pub buck_hash_sys: u64,
    #[serde(rename = "GCSys")]
    pub gc_sys: u64,
    #[serde(rename = "OtherSys")]
    pub other_sys: u64,

    // GC
    #[serde(rename = "NextGC")]
    pub next_gc: u64,
    #[serde(rename = "LastGC")]
    pub last_gc: u64,
    #[serde(rename = "PauseTotalNs")]
    pub pause_total_ns: u64,
    #[serde(rename = "PauseNs")]
    pub pause_ns: PauseHistogram,
    // Newer runtimes only; older documents omit these.
    #[serde(rename = "PauseEnd", default)]
    pub pause_end: PauseHistogram,
    #[serde(rename = "NumGC")]
    pub num_gc: u32,
    #[serde(rename = "NumForcedGC", default)]
    pub num_forced_gc: u32,
    #[serde(rename = "GCCPUFraction", default)]
    pub gc_cpu_fraction: f64,
    #[serde(rename = "EnableGC")]
    pub enable_gc: bool,
    #[serde(rename = "DebugGC")]
    pub debug_gc: bool,

    #[serde(rename = "BySize")]
    pub by_size: Vec<SizeClass>,
}

/// Per size-class allocation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeClass {
    #[serde(rename = "Size")]
    pub size: u32,
    #[serde(rename = "Mallocs")]
    pub mallocs: u64,
    #[serde(rename = "Frees")]
    pub frees: u64,
}

/// Fixed-size circular buffer of recent GC pause durations (ns).
///
/// Shorter input arrays are zero-padded; more than [`PAUSE_SLOTS`] entries is
/// a decode error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PauseHistogram(Box<[u64; PAUSE_SLOTS]>);

impl PauseHistogram {
    pub fn as_slice(&self) -> &[u64] {
        &self.0[..]
    }

    /// Slot for the `n`th GC (1-based, as the runtime counts them).
    pub fn slot_for(num_gc: u32) -> usize {
        (num_gc as usize + PAUSE_SLOTS - 1) % PAUSE_SLOTS
    }
}

impl Default for PauseHistogram {
    fn default() -> Self {
        Self(Box::new([0; PAUSE_SLOTS]))
    }
}

impl From<[u64; PAUSE_SLOTS]> for PauseHistogram {
    fn from(values: [u64; PAUSE_SLOTS]) -> Self {
        Self(Box::new(values))
    }
}

impl std::ops::Index<usize> for PauseHistogram {
    type Output = u64;

    fn index(&self, i: usize) -> &u64 {
        &self.0[i]
    }
}

impl std::ops::IndexMut<usize> for PauseHistogram {
    fn index_mut(&mut self, i: usize) -> &mut u64 {
        &mut self.0[i]
    }
}

impl Serialize for PauseHistogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for PauseHistogram {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<u64>::deserialize(deserializer)?;
        if values.len() > PAUSE_SLOTS {
            return Err(D::Error::invalid_length(
                values.len(),
                &"at most 256 pause samples",
            ));
        }
        let mut out = Self::default();
        out.0[..values.len()].copy_from_slice(&values);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_pause_array_is_zero_padded() {
        let h: PauseHistogram = serde_json::from_str("[5, 6, 7]").unwrap();
        assert_eq!(&h.as_slice()[..3], &[5, 6, 7]);
        assert!(h.as_slice()[3..].iter().all(|&v| v == 0));
        assert_eq!(h.as_slice().len(), PAUSE_SLOTS);
    }

    #[test]
    fn oversized_pause_array_is_rejected() {
        let too_many = vec![1u64; PAUSE_SLOTS + 1];
        let js = serde_json::to_string(&too_many).unwrap();
        assert!(serde_json::from_str::<PauseHistogram>(&js).is_err());
    }

    #[test]
    fn pause_histogram_serializes_every_slot() {
        let mut h = PauseHistogram::default();
        h[PAUSE_SLOTS - 1] = 42;
        let v: Vec<u64> = serde_json::from_value(serde_json::to_value(&h).unwrap()).unwrap();
        assert_eq!(v.len(), PAUSE_SLOTS);
        assert_eq!(v[PAUSE_SLOTS - 1], 42);
    }

    #[test]
    fn slot_for_wraps_around() {
        assert_eq!(PauseHistogram::slot_for(1), 0);
        assert_eq!(PauseHistogram::slot_for(256), 255);
        assert_eq!(PauseHistogram::slot_for(257), 0);
    }
}
