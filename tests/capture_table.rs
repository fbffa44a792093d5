//! Concurrent use of the capture table.

use std::sync::Arc;

use dotemit::prelude::*;
use rayon::prelude::*;

fn payload_type() -> CilTypeRc {
    Arc::new(CilType::new(Token::new(0x0200_0012), "Demo", "Payload", "Demo"))
}

#[test]
fn parallel_insert_then_take() -> Result<()> {
    let table = CaptureTable::new();
    let ty = payload_type();

    let keys: Vec<u64> = (0..512).map(|_| CaptureTable::next_key()).collect();
    keys.par_iter().try_for_each(|&key| {
        table.insert(key, CapturedObject::new(ty.clone(), key.wrapping_mul(3)))
    })?;
    assert_eq!(table.len()?, keys.len());

    let taken: Vec<(u64, u64)> = keys
        .par_iter()
        .map(|&key| {
            let object = table.take(key)?;
            Ok((key, object.downcast_ref::<u64>().copied().unwrap_or_default()))
        })
        .collect::<Result<_>>()?;

    assert!(taken.iter().all(|(key, value)| *value == key.wrapping_mul(3)));
    assert!(table.is_empty()?);
    Ok(())
}

#[test]
fn parallel_keys_never_repeat() {
    let mut keys: Vec<u64> = (0..4096)
        .into_par_iter()
        .map(|_| CaptureTable::next_key())
        .collect();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), 4096);
}

#[test]
fn each_object_is_taken_once() -> Result<()> {
    let table = CaptureTable::new();
    let key = CaptureTable::next_key();
    table.insert(key, CapturedObject::new(payload_type(), "payload"))?;

    let winners = (0..64)
        .into_par_iter()
        .filter(|_| table.take(key).is_ok())
        .count();
    assert_eq!(winners, 1);
    assert!(matches!(table.take(key), Err(Error::CaptureKeyMissing(k)) if k == key));
    Ok(())
}

#[test]
fn occupied_keys_are_rejected() -> Result<()> {
    let table = CaptureTable::new();
    let key = CaptureTable::next_key();
    table.insert(key, CapturedObject::new(payload_type(), 1u8))?;

    assert!(matches!(
        table.insert(key, CapturedObject::new(payload_type(), 2u8)),
        Err(Error::CaptureKeyCollision(k)) if k == key
    ));
    assert_eq!(table.take(key)?.downcast_ref::<u8>(), Some(&1));
    Ok(())
}
