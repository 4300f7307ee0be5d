//! End-to-end scenarios over the in-process store: the canonical
//! three-point query, endpoint normalization, updates, boundary
//! inclusivity, and the error surface of the id-keyed operations.


use anyhow::Result;
use common::{plane, HKEY, ZKEY};
use redimension_core::{IndexError, RangeIndex};
use redimension_storage_memory::MemoryStore;

#[tokio::test]
async fn query_returns_only_points_inside_the_box() -> Result<()> {
    let mut index = plane();
    index.index(ZKEY, HKEY, "aa", &[45, 120000]).await?;
    index.index(ZKEY, HKEY, "bb", &[50, 110000]).await?;
    index.index(ZKEY, HKEY, "cc", &[30, 125000]).await?;

    let hits = index.query(ZKEY, &[(40, 50), (100000, 115000)]).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "bb");
    assert_eq!(hits[0].pos, vec![50, 110000]);
    Ok(())
}

#[tokio::test]
async fn swapped_endpoints_query_the_same_box() -> Result<()> {
    let mut index = plane();
    index.index(ZKEY, HKEY, "aa", &[45, 120000]).await?;
    index.index(ZKEY, HKEY, "bb", &[50, 110000]).await?;
    index.index(ZKEY, HKEY, "cc", &[30, 125000]).await?;

    let straight = index.query(ZKEY, &[(40, 50), (100000, 115000)]).await?;
    let swapped = index.query(ZKEY, &[(50, 40), (115000, 100000)]).await?;
    assert_eq!(straight, swapped);
    Ok(())
}

#[tokio::test]
async fn update_moves_a_point() -> Result<()> {
    let mut index = plane();
    index.index(ZKEY, HKEY, "aa", &[10, 10]).await?;
    index.update(ZKEY, HKEY, "aa", &[100, 100]).await?;

    assert!(index.query(ZKEY, &[(0, 50), (0, 50)]).await?.is_empty());
    let hits = index.query(ZKEY, &[(50, 200), (50, 200)]).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "aa");
    assert_eq!(index.get_pos(HKEY, "aa").await?, vec![100, 100]);

    // The map must hold exactly the element string now in the set.
    let store = index.into_connection();
    assert_eq!(store.hash_entries(HKEY), vec![("aa".to_string(), store.zset_entries(ZKEY)[0].clone())]);
    Ok(())
}

#[tokio::test]
async fn update_requires_an_existing_binding() -> Result<()> {
    let mut index = plane();
    assert!(matches!(index.update(ZKEY, HKEY, "aa", &[1, 1]).await, Err(IndexError::NotFound(id)) if id == "aa"));
    Ok(())
}

#[tokio::test]
async fn degenerate_box_returns_its_point() -> Result<()> {
    let mut index = plane();
    index.index(ZKEY, HKEY, "p", &[40, 100000]).await?;
    let hits = index.query(ZKEY, &[(40, 40), (100000, 100000)]).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "p");
    Ok(())
}

#[tokio::test]
async fn unindex_by_id_unknown_id_is_not_found() -> Result<()> {
    let mut index = plane();
    assert!(matches!(index.unindex_by_id(ZKEY, HKEY, "ghost").await, Err(IndexError::NotFound(id)) if id == "ghost"));
    Ok(())
}

#[tokio::test]
async fn batch_arity_mismatch_is_rejected_up_front() -> Result<()> {
    let mut index = plane();
    let err = index.batch_index(ZKEY, HKEY, &["a".to_string(), "b".to_string()], &[vec![1, 1]]).await;
    assert!(matches!(err, Err(IndexError::BatchMismatch { ids: 2, positions: 1 })));
    // Nothing was written.
    assert!(index.query(ZKEY, &[(0, 100), (0, 100)]).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn batch_unindex_fails_on_any_unknown_id() -> Result<()> {
    let mut index = plane();
    index.index(ZKEY, HKEY, "known", &[1, 1]).await?;
    let ids = vec!["known".to_string(), "unknown".to_string()];
    assert!(matches!(index.batch_unindex_by_id(ZKEY, HKEY, &ids).await, Err(IndexError::NotFound(id)) if id == "unknown"));
    // The known binding survives the refused batch.
    assert_eq!(index.get_pos(HKEY, "known").await?, vec![1, 1]);
    Ok(())
}

#[tokio::test]
async fn ids_with_the_separator_are_rejected() -> Result<()> {
    let mut index = plane();
    assert!(matches!(index.index(ZKEY, HKEY, "a:b", &[1, 1]).await, Err(IndexError::InvalidId(_))));
    assert!(matches!(index.unindex(ZKEY, HKEY, "a:b", &[1, 1]).await, Err(IndexError::InvalidId(_))));
    Ok(())
}

#[tokio::test]
async fn wrong_dimension_count_is_rejected() -> Result<()> {
    let mut index = plane();
    assert!(matches!(index.index(ZKEY, HKEY, "a", &[1]).await, Err(IndexError::DimensionMismatch { expected: 2, got: 1 })));
    assert!(matches!(index.query(ZKEY, &[(0, 1)]).await, Err(IndexError::DimensionMismatch { expected: 2, got: 1 })));
    Ok(())
}

#[tokio::test]
async fn batch_get_pos_preserves_input_order() -> Result<()> {
    let mut index = RangeIndex::new(MemoryStore::new(), 2, 32)?;
    let ids: Vec<String> = (0..4).map(|i| format!("p{i}")).collect();
    let positions: Vec<Vec<u64>> = vec![vec![4, 40], vec![3, 30], vec![2, 20], vec![1, 10]];
    index.batch_index(ZKEY, HKEY, &ids, &positions).await?;
    assert_eq!(index.batch_get_pos(HKEY, &ids).await?, positions);
    Ok(())
}

#[tokio::test]
async fn update_behaves_the_same_on_the_durable_backend() -> Result<()> {
    use redimension_storage_sled::SledStore;

    let mut index = RangeIndex::new(SledStore::new_test()?, 2, 64)?;
    index.index(ZKEY, HKEY, "aa", &[10, 10]).await?;
    index.update(ZKEY, HKEY, "aa", &[100, 100]).await?;

    assert!(index.query(ZKEY, &[(0, 50), (0, 50)]).await?.is_empty());
    let hits = index.query(ZKEY, &[(50, 200), (50, 200)]).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "aa");
    assert_eq!(index.get_pos(HKEY, "aa").await?, vec![100, 100]);
    Ok(())
}

#[tokio::test]
async fn foreign_zset_entries_surface_as_malformed() -> Result<()> {
    use redimension_core::storage::{Command, Connection};

    let mut store = MemoryStore::new();
    store.send(Command::ZAdd { key: ZKEY.into(), member: "0000:not-a-number:9:alien".into() });
    store.flush().await?;
    store.receive().await?;

    let mut index = RangeIndex::new(store, 2, 8)?;
    index.index(ZKEY, HKEY, "ok", &[1, 9]).await?;
    assert!(matches!(index.query(ZKEY, &[(0, 255), (0, 255)]).await, Err(IndexError::MalformedEntry(_))));
    Ok(())
}
