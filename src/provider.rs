use ipmeta_index::{ProviderId, RecordRef};
use rustc_hash::FxHashMap as HashMap;

use crate::record::Record;

/// Providers every engine knows about, with their fixed ids.
pub const BUILTIN_PROVIDERS: [(u8, &str, &str); 4] = [
    (1, "maxmind", "MaxMind GeoIP city and country blocks"),
    (2, "netacq-edge", "Net Acuity Edge geolocation"),
    (3, "pfx2as", "CAIDA RouteViews prefix to AS mappings"),
    (4, "ipinfo", "IPinfo geolocation and ASN"),
];

/// A metadata source and the records it owns.
#[derive(Debug)]
pub struct Provider {
    id: ProviderId,
    name: String,
    description: String,
    enabled: bool,
    records: HashMap<u32, Record>,
}

impl Provider {
    pub(crate) fn new(id: ProviderId, name: &str, description: &str) -> Provider {
        Provider {
            id,
            name: name.to_string(),
            description: description.to_string(),
            enabled: false,
            records: HashMap::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> ProviderId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self) {
        self.enabled = true;
    }

    /// Store `record` under its own id, replacing any earlier record with
    /// that id.
    pub fn insert_record(&mut self, record: Record) -> RecordRef {
        let id = record.id;
        self.records.insert(id, record);
        RecordRef::new(self.id, id)
    }

    #[inline]
    pub fn record(&self, id: u32) -> Option<&Record> {
        self.records.get(&id)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Records in ascending id order.
    pub fn records(&self) -> Vec<&Record> {
        let mut records: Vec<_> = self.records.values().collect();
        records.sort_unstable_by_key(|r| r.id);
        records
    }
}
