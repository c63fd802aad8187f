use drcs_cog::contract::{KeyPage, MockObjectStore};
use drcs_cog::error::StoreError;
use drcs_cog::store::{list_keys, object_key};
use mockall::predicate::eq;
use mockall::Sequence;

fn page(keys: &[&str], next: Option<&str>) -> KeyPage {
    KeyPage {
        keys: keys.iter().map(|k| k.to_string()).collect(),
        next_continuation: next.map(str::to_string),
    }
}

#[tokio::test]
async fn follows_continuation_tokens_and_filters_keys() {
    let mut store = MockObjectStore::new();
    let mut seq = Sequence::new();
    store
        .expect_list_page()
        .with(eq("imagery"), eq("drcs_activations/e/"), eq(None::<String>))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _| {
            Ok(page(
                &["drcs_activations/e/a.tif", "drcs_activations/e/a.tif.aux.xml"],
                Some("token-1"),
            ))
        });
    store
        .expect_list_page()
        .with(eq("imagery"), eq("drcs_activations/e/"), eq(Some("token-1".to_string())))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _, _| {
            Ok(page(
                &["drcs_activations/e/historical/old.tif", "drcs_activations/e/b.tif"],
                None,
            ))
        });

    let keys = list_keys(&store, "imagery", "drcs_activations/e/", ".tif")
        .await
        .unwrap();
    assert_eq!(keys, vec!["drcs_activations/e/a.tif", "drcs_activations/e/b.tif"]);
}

#[tokio::test]
async fn empty_token_ends_the_listing() {
    let mut store = MockObjectStore::new();
    store
        .expect_list_page()
        .times(1)
        .returning(|_, _, _| Ok(page(&["p/x.tif"], Some(""))));

    let keys = list_keys(&store, "b", "p", ".tif").await.unwrap();
    assert_eq!(keys, vec!["p/x.tif"]);
}

#[tokio::test]
async fn listing_errors_propagate() {
    let mut store = MockObjectStore::new();
    store.expect_list_page().returning(|bucket, prefix, _| {
        Err(StoreError::List {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            source: "no such bucket".into(),
        })
    });

    let err = list_keys(&store, "missing", "p", ".tif").await.unwrap_err();
    assert!(err.to_string().contains("s3://missing/p/"), "{err}");
}

#[test]
fn object_keys_join_without_double_slashes() {
    assert_eq!(object_key("cogs/event/", "a.tif"), "cogs/event/a.tif");
    assert_eq!(object_key("", "metadata.json"), "metadata.json");
    assert_eq!(object_key("/", "x"), "x");
}
