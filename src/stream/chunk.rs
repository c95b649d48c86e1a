//! Chunking
//!
//! Groups elements into `Vec` buffers. A chunk is filled eagerly within a
//! single pull of the chunked stream; chunks themselves stay lazy.

use std::sync::Arc;

use super::{Step, Stream};
use crate::error::{Result, require_positive};
use crate::task::Task;

// Upper bound on the initial buffer reservation for large chunk sizes.
const MAX_PREALLOC: usize = 1024;

impl<A: Send + 'static> Stream<A> {
    /// Group elements into chunks of `size`. The last chunk may be shorter.
    ///
    /// Returns [`StreamError::InvalidArgument`](crate::StreamError::InvalidArgument)
    /// when `size` is zero.
    pub fn chunk(self, size: usize) -> Result<Stream<Vec<A>>> {
        let size = require_positive("chunk size", size)?;
        Ok(chunked(self, size))
    }

    /// Apply a batch transform to chunks of `size` and flatten the results.
    pub fn map_chunked<B, F>(self, size: usize, f: F) -> Result<Stream<B>>
    where
        B: Send + 'static,
        F: Fn(Vec<A>) -> Vec<B> + Send + Sync + 'static,
    {
        Ok(self.chunk(size)?.flat_map(move |batch| Stream::from_iter(f(batch))))
    }
}

impl<A: Clone + Send + Sync + 'static> Stream<A> {
    /// Start a new chunk whenever `same_group(previous, current)` is false.
    pub fn chunk_while<P>(self, same_group: P) -> Stream<Vec<A>>
    where
        P: Fn(&A, &A) -> bool + Send + Sync + 'static,
    {
        chunked_while(self, None, Arc::new(same_group))
    }
}

fn chunked<A: Send + 'static>(source: Stream<A>, size: usize) -> Stream<Vec<A>> {
    Stream::from_pull(move || {
        let mut current = source.clone();
        Task::from_future(async move {
            let mut buffer = Vec::with_capacity(size.min(MAX_PREALLOC));
            loop {
                match current.pull().run().await? {
                    Step::Emit(value, tail) => {
                        buffer.push(value);
                        if buffer.len() == size {
                            return Ok(Step::Emit(buffer, chunked(tail, size)));
                        }
                        current = tail;
                    }
                    Step::Skip(tail) => current = tail,
                    Step::Done if buffer.is_empty() => return Ok(Step::Done),
                    Step::Done => return Ok(Step::Emit(buffer, Stream::empty())),
                }
            }
        })
    })
}

/// `carry` is the first element of the next chunk, read while closing the
/// previous one.
fn chunked_while<A, P>(source: Stream<A>, carry: Option<A>, same_group: Arc<P>) -> Stream<Vec<A>>
where
    A: Clone + Send + Sync + 'static,
    P: Fn(&A, &A) -> bool + Send + Sync + 'static,
{
    Stream::from_pull(move || {
        let mut current = source.clone();
        let same_group = same_group.clone();
        let mut buffer: Vec<A> = carry.iter().cloned().collect();
        Task::from_future(async move {
            loop {
                match current.pull().run().await? {
                    Step::Emit(value, tail) => {
                        let split = buffer
                            .last()
                            .is_some_and(|previous| !same_group(previous, &value));
                        if split {
                            return Ok(Step::Emit(
                                buffer,
                                chunked_while(tail, Some(value), same_group),
                            ));
                        }
                        buffer.push(value);
                        current = tail;
                    }
                    Step::Skip(tail) => current = tail,
                    Step::Done if buffer.is_empty() => return Ok(Step::Done),
                    Step::Done => return Ok(Step::Emit(buffer, Stream::empty())),
                }
            }
        })
    })
}
