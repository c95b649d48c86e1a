//! Chunk assembly.

use pullstream::prelude::*;

#[tokio::test]
async fn chunk_three_over_seven() {
    let chunks = Stream::range(1, 8).chunk(3).unwrap().to_list().run().await;
    assert_eq!(chunks, Ok(vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]));
}

#[tokio::test]
async fn chunk_one_yields_singletons() {
    let chunks = Stream::range(1, 4).chunk(1).unwrap().to_list().run().await;
    assert_eq!(chunks, Ok(vec![vec![1], vec![2], vec![3]]));
}

#[tokio::test]
async fn chunk_larger_than_stream() {
    for size in [5, 6, 1_000_000] {
        let chunks = Stream::range(1, 6).chunk(size).unwrap().to_list().run().await;
        assert_eq!(chunks, Ok(vec![vec![1, 2, 3, 4, 5]]));
    }
}

#[tokio::test]
async fn chunks_are_lazy_across() {
    let first = Stream::iterate(0u64, |n| n + 1)
        .chunk(4)
        .unwrap()
        .head_option()
        .run()
        .await;
    assert_eq!(first, Ok(Some(vec![0, 1, 2, 3])));
}

#[tokio::test]
async fn chunk_while_groups_equal_runs() {
    let groups = Stream::of([1, 1, 2, 2, 2, 3])
        .chunk_while(|a, b| a == b)
        .to_list()
        .run()
        .await;
    assert_eq!(groups, Ok(vec![vec![1, 1], vec![2, 2, 2], vec![3]]));
}

#[tokio::test]
async fn chunk_while_ascending_runs() {
    let runs = Stream::of([1, 2, 3, 2, 5, 1])
        .chunk_while(|a, b| b > a)
        .to_list()
        .run()
        .await;
    assert_eq!(runs, Ok(vec![vec![1, 2, 3], vec![2, 5], vec![1]]));
}

#[test]
fn zero_sizes_are_rejected_when_built() {
    assert!(matches!(
        Stream::range(0, 3).chunk(0),
        Err(StreamError::InvalidArgument(_))
    ));
    assert!(Stream::range(0, 3).map_chunked(0, |batch| batch).is_err());
}
