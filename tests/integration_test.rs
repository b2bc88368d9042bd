use std::net::IpAddr;

use ipmeta::{
    Engine, Error, IndexKind, Prefix, ProviderId, ProviderMask, Record, RecordRef, RecordSet,
};
use proptest::prelude::*;

fn prefix(s: &str) -> Prefix {
    s.parse().expect("valid prefix")
}

fn addr(s: &str) -> IpAddr {
    s.parse().expect("valid address")
}

// An engine with `names` enabled and one record each, returned in order
fn engine_with(kind: IndexKind, names: &[&str]) -> (Engine, Vec<RecordRef>) {
    let mut engine = Engine::new(kind);
    let mut refs = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let id = engine.enable_provider_by_name(name).expect("builtin provider");
        let mut record = Record::new(i as u32 + 1);
        record.city = format!("{name} city");
        refs.push(engine.register_record(id, record).expect("register"));
    }
    (engine, refs)
}

fn found(engine: &Engine, out: &RecordSet) -> Vec<(String, u64)> {
    engine
        .resolve(out)
        .map(|m| (m.provider.to_string(), m.ip_count))
        .collect()
}

#[test]
fn more_specific_prefix_shadows_one_address() {
    let (mut engine, refs) = engine_with(IndexKind::Patricia, &["maxmind"]);
    let host = engine
        .register_record(refs[0].provider, Record::new(50))
        .unwrap();
    engine.associate(&prefix("10.0.0.0/24"), refs[0]).unwrap();
    engine.associate(&prefix("10.0.0.7/32"), host).unwrap();

    let mut out = RecordSet::new();
    for last in 0..=255u8 {
        let a = IpAddr::from([10, 0, 0, last]);
        assert_eq!(engine.lookup_address(a, ProviderMask::EMPTY, &mut out).unwrap(), 1);
        let expected = if last == 7 { host } else { refs[0] };
        assert_eq!(out.as_slice()[0].record, expected, "10.0.0.{last}");
        assert_eq!(out.as_slice()[0].ip_count, 1);
    }
}

#[test]
fn providers_resolve_at_different_depths() {
    let (mut engine, refs) = engine_with(IndexKind::Patricia, &["maxmind", "ipinfo"]);
    engine.associate(&prefix("10.0.0.0/8"), refs[0]).unwrap();
    engine.associate(&prefix("10.0.0.0/16"), refs[1]).unwrap();

    let mut out = RecordSet::new();
    engine.lookup_address(addr("10.0.5.5"), ProviderMask::EMPTY, &mut out).unwrap();
    let mut names: Vec<_> = found(&engine, &out).into_iter().map(|(n, _)| n).collect();
    names.sort();
    assert_eq!(names, ["ipinfo", "maxmind"]);

    // Outside the /16 only the /8 applies.
    engine.lookup_address(addr("10.9.0.1"), ProviderMask::EMPTY, &mut out).unwrap();
    assert_eq!(found(&engine, &out), vec![("maxmind".to_string(), 1)]);
}

#[test]
fn range_weights_count_the_overlap() {
    for kind in IndexKind::ALL {
        let (mut engine, refs) = engine_with(kind, &["pfx2as"]);
        engine.associate(&prefix("10.0.0.0/24"), refs[0]).unwrap();

        let mut out = RecordSet::new();
        engine.lookup(&prefix("10.0.0.0/25"), ProviderMask::EMPTY, &mut out).unwrap();
        assert_eq!(found(&engine, &out), vec![("pfx2as".to_string(), 128)], "{kind}");

        engine.lookup(&prefix("10.0.0.0/8"), ProviderMask::EMPTY, &mut out).unwrap();
        assert_eq!(found(&engine, &out), vec![("pfx2as".to_string(), 256)], "{kind}");
    }
}

#[test]
fn bigarray_covers_exactly_its_block() {
    let (mut engine, refs) = engine_with(IndexKind::BigArray, &["netacq-edge"]);
    engine.associate(&prefix("192.168.0.0/16"), refs[0]).unwrap();

    let mut out = RecordSet::new();
    for (a, hit) in [
        ("192.168.0.0", true),
        ("192.168.128.64", true),
        ("192.168.255.255", true),
        ("192.167.255.255", false),
        ("192.169.0.0", false),
    ] {
        let n = engine.lookup_address(addr(a), ProviderMask::EMPTY, &mut out).unwrap();
        assert_eq!(n == 1, hit, "{a}");
    }

    let err = engine
        .associate(&prefix("2001:db8::/32"), refs[0])
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Index(ipmeta_index::Error::UnsupportedFamily { .. })
    ));
}

#[test]
fn interval_engine_takes_one_provider() {
    let (mut engine, refs) = engine_with(IndexKind::IntervalTree, &["maxmind", "ipinfo"]);
    engine.associate(&prefix("10.0.0.0/8"), refs[0]).unwrap();
    engine.associate(&prefix("11.0.0.0/8"), refs[0]).unwrap();
    let err = engine.associate(&prefix("12.0.0.0/8"), refs[1]).unwrap_err();
    assert!(matches!(
        err,
        Error::Index(ipmeta_index::Error::MultiProviderNotSupported { .. })
    ));

    // The index is still usable after the rejected insert.
    let mut out = RecordSet::new();
    assert_eq!(engine.lookup_str("11.1.1.1", ProviderMask::EMPTY, &mut out).unwrap(), 1);
}

#[test]
fn lookups_reuse_the_record_set() {
    let (mut engine, refs) = engine_with(IndexKind::Patricia, &["maxmind"]);
    engine.associate(&prefix("10.0.0.0/8"), refs[0]).unwrap();

    let mut out = RecordSet::with_capacity(4);
    let capacity = out.capacity();
    for _ in 0..10 {
        engine.lookup_str("10.1.1.1", ProviderMask::EMPTY, &mut out).unwrap();
        assert_eq!(out.len(), 1);
    }
    assert_eq!(out.capacity(), capacity);
}

#[test]
fn reregistered_record_is_resolved_fresh() {
    let (mut engine, refs) = engine_with(IndexKind::Patricia, &["ipinfo"]);
    engine.associate(&prefix("203.0.113.0/24"), refs[0]).unwrap();

    let mut updated = Record::new(refs[0].id);
    updated.city = "Updated".into();
    engine.register_record(refs[0].provider, updated).unwrap();

    let mut out = RecordSet::new();
    engine.lookup_str("203.0.113.9", ProviderMask::EMPTY, &mut out).unwrap();
    let resolved: Vec<_> = engine.resolve(&out).collect();
    assert_eq!(resolved[0].record.city, "Updated");
}

const NAMES: [&str; 4] = ["maxmind", "netacq-edge", "pfx2as", "ipinfo"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Narrowing the mask only ever removes results.
    #[test]
    fn smaller_mask_yields_subset(
        entries in prop::collection::vec((0usize..4, any::<u32>(), 8u8..=32), 1..32),
        probe in any::<u32>(),
        small in 0u32..16,
        extra in 0u32..16,
    ) {
        let (mut engine, refs) = engine_with(IndexKind::Patricia, &NAMES);
        for (provider, bits, len) in &entries {
            let p = Prefix::from_ip(IpAddr::from(bits.to_be_bytes()), *len).unwrap();
            engine.associate(&p, refs[*provider]).unwrap();
        }
        let m1 = ProviderMask::from_bits(small);
        let m2 = ProviderMask::from_bits(small | extra);
        prop_assume!(!m1.is_empty());

        let a = IpAddr::from(probe.to_be_bytes());
        let mut out1 = RecordSet::new();
        let mut out2 = RecordSet::new();
        engine.lookup_address(a, m1, &mut out1).unwrap();
        engine.lookup_address(a, m2, &mut out2).unwrap();

        let larger: Vec<RecordRef> = out2.iter().map(|m| m.record).collect();
        for m in &out1 {
            prop_assert!(larger.contains(&m.record));
            prop_assert!(m1.contains(m.record.provider));
        }
    }

    /// Every inserted IPv4 prefix answers a point lookup at its base address.
    #[test]
    fn exact_round_trip(bits in any::<u32>(), len in 16u8..=32, kind in 0usize..3) {
        let kind = IndexKind::ALL[kind];
        let (mut engine, refs) = engine_with(kind, &["pfx2as"]);
        let p = Prefix::from_ip(IpAddr::from(bits.to_be_bytes()), len).unwrap();
        engine.associate(&p, refs[0]).unwrap();

        let mut out = RecordSet::new();
        engine.lookup_address(p.addr(), ProviderMask::EMPTY, &mut out).unwrap();
        prop_assert_eq!(out.len(), 1);
        prop_assert_eq!(out.as_slice()[0].record, refs[0]);
        prop_assert_eq!(out.as_slice()[0].ip_count, 1);
    }
}

#[test]
fn provider_ids_are_stable() {
    let engine = Engine::default();
    for (id, name, _) in ipmeta::BUILTIN_PROVIDERS {
        let provider = engine.provider_by_name(name).unwrap();
        assert_eq!(provider.id(), ProviderId::new(id).unwrap());
    }
}
