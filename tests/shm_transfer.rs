use multicam::error::ShmError;
use multicam::shm::{self, ElementType, SharedBufferDescriptor};
use proptest::prelude::*;

/// What a consumer holds after the descriptor crossed the process boundary.
fn across_queue(desc: &SharedBufferDescriptor) -> SharedBufferDescriptor {
    serde_json::from_str(&serde_json::to_string(desc).unwrap()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn published_bytes_come_back_unchanged(data in prop::collection::vec(any::<u16>(), 1..4096)) {
        let desc = shm::publish(&data, &[data.len()]).unwrap();
        let remote = across_queue(&desc);

        let copy = shm::resolve_and_copy(&remote).unwrap();
        prop_assert_eq!(copy.element_type(), ElementType::U16);
        prop_assert_eq!(copy.shape(), &[data.len()][..]);
        prop_assert_eq!(copy.to_vec::<u16>().unwrap(), data);

        shm::release(remote).unwrap();
        let err = shm::resolve_and_copy(&desc).unwrap_err();
        prop_assert!(err.is_region_not_found());
    }
}

#[test]
fn copy_outlives_the_region() {
    let frame: Vec<u8> = (0..=255).cycle().take(4 * 6 * 3).collect();
    let desc = shm::publish(&frame, &[4, 6, 3]).unwrap();
    let name = desc.name().to_owned();

    let image = shm::resolve_and_copy(&desc).unwrap().into_rgb_image().unwrap();
    shm::release(desc).unwrap();

    assert!(!shm::region_exists(&name));
    assert_eq!(image.dimensions(), (6, 4));
    assert_eq!(image.as_raw(), &frame);
}

#[test]
fn second_release_reports_missing_region() {
    let desc = shm::publish(&[1.5f32, 2.5], &[2]).unwrap();
    let stale = across_queue(&desc);
    shm::release(desc).unwrap();

    match shm::release(stale) {
        Err(ShmError::RegionNotFound { .. }) => {}
        other => panic!("expected RegionNotFound, got {:?}", other),
    }
}

#[test]
fn every_publish_gets_a_fresh_name() {
    let a = shm::publish(&[0u8; 16], &[16]).unwrap();
    let b = shm::publish(&[0u8; 16], &[16]).unwrap();
    assert_ne!(a.name(), b.name());
    shm::release(a).unwrap();
    shm::release(b).unwrap();
}
