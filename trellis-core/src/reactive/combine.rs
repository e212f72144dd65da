//! Latest-value combination of executor streams.

use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};

use crate::error::Result;

/// Combine streams into a stream of their latest values.
///
/// Nothing is emitted until every input has produced at least one value;
/// afterwards each new value from any input emits the full vector again, in
/// input order. An empty input emits a single empty vector. The first error
/// is forwarded and ends the combined stream.
pub fn combine_latest<T>(
    streams: Vec<BoxStream<'static, Result<T>>>,
) -> BoxStream<'static, Result<Vec<T>>>
where
    T: Clone + Send + 'static,
{
    let count = streams.len();
    if count == 0 {
        return stream::once(future::ready(Ok(Vec::new()))).boxed();
    }

    let indexed = stream::select_all(
        streams
            .into_iter()
            .enumerate()
            .map(|(index, inner)| inner.map(move |item| (index, item)).boxed()),
    );

    stream::unfold(
        (indexed, vec![None; count], false),
        |(mut indexed, mut latest, failed)| async move {
            if failed {
                return None;
            }
            loop {
                let (index, item) = indexed.next().await?;
                match item {
                    Ok(value) => {
                        latest[index] = Some(value);
                        if latest.iter().all(Option::is_some) {
                            let snapshot: Vec<T> = latest.iter().flatten().cloned().collect();
                            return Some((Ok(snapshot), (indexed, latest, false)));
                        }
                    }
                    Err(err) => return Some((Err(err), (indexed, latest, true))),
                }
            }
        },
    )
    .boxed()
}
