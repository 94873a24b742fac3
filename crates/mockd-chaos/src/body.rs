//! Write-phase body transforms
//!
//! Truncation, corruption, and throttling act on the streaming write path,
//! not on pre-buffered bodies, so they compose with SSE and large responses
//! without materializing anything.

use crate::injector::BodyPlan;
use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use rand::Rng;
use std::time::Duration;

/// Apply a body plan to a response body
///
/// Transforms run in truncate -> corrupt -> throttle order per chunk.
pub fn transform_body(body: Body, plan: &BodyPlan) -> Body {
    if plan.empty {
        return Body::empty();
    }
    if plan.is_noop() {
        return body;
    }

    let corrupt_rate = plan.corrupt_rate;
    let throttle_bps = plan.throttle_bps;
    let stream = body
        .into_data_stream()
        .scan(plan.max_bytes, move |budget, chunk| {
            let item = match chunk {
                Ok(chunk) => {
                    let chunk = match budget {
                        Some(remaining) => {
                            if *remaining == 0 {
                                return futures::future::ready(None);
                            }
                            let take = chunk.len().min(*remaining);
                            *remaining -= take;
                            chunk.slice(..take)
                        }
                        None => chunk,
                    };
                    let chunk = match corrupt_rate {
                        Some(rate) => corrupt(chunk, rate),
                        None => chunk,
                    };
                    Ok(chunk)
                }
                Err(e) => Err(e),
            };
            futures::future::ready(Some(item))
        })
        .then(move |item| async move {
            if let (Ok(chunk), Some(bps)) = (&item, throttle_bps) {
                tokio::time::sleep(write_delay(chunk.len(), bps)).await;
            }
            item
        });
    Body::from_stream(stream)
}

/// A body whose stream fails immediately, tearing the connection down
pub fn reset_body() -> Body {
    Body::from_stream(futures::stream::once(async {
        Err::<Bytes, std::io::Error>(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "injected connection reset",
        ))
    }))
}

fn write_delay(len: usize, bytes_per_second: u64) -> Duration {
    if bytes_per_second == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(len as f64 / bytes_per_second as f64)
}

/// Flip one random bit in roughly `rate` of the bytes
fn corrupt(chunk: Bytes, rate: f64) -> Bytes {
    let mut rng = rand::rng();
    let mut buf = BytesMut::from(&chunk[..]);
    for byte in buf.iter_mut() {
        if rng.random_bool(rate.clamp(0.0, 1.0)) {
            *byte ^= 1 << rng.random_range(0..8);
        }
    }
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn collect(body: Body) -> Vec<u8> {
        body.collect().await.unwrap().to_bytes().to_vec()
    }

    #[tokio::test]
    async fn noop_plan_passes_through() {
        let out = collect(transform_body(Body::from("hello"), &BodyPlan::default())).await;
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn empty_plan_drops_body() {
        let plan = BodyPlan {
            empty: true,
            ..BodyPlan::default()
        };
        let out = collect(transform_body(Body::from("hello"), &plan)).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn truncation_respects_budget() {
        let plan = BodyPlan {
            max_bytes: Some(4),
            ..BodyPlan::default()
        };
        let out = collect(transform_body(Body::from("hello world"), &plan)).await;
        assert_eq!(out, b"hell");
    }

    #[tokio::test]
    async fn full_corruption_changes_every_byte() {
        let plan = BodyPlan {
            corrupt_rate: Some(1.0),
            ..BodyPlan::default()
        };
        let input = vec![0u8; 64];
        let out = collect(transform_body(Body::from(input.clone()), &plan)).await;
        assert_eq!(out.len(), 64);
        // Every byte had exactly one bit flipped.
        assert!(out.iter().all(|b| b.count_ones() == 1));
    }

    #[tokio::test]
    async fn throttle_slows_the_write() {
        let plan = BodyPlan {
            throttle_bps: Some(1_000),
            ..BodyPlan::default()
        };
        let start = std::time::Instant::now();
        let _ = collect(transform_body(Body::from(vec![0u8; 100]), &plan)).await;
        // 100 bytes at 1000 B/s is at least 100ms.
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn reset_body_errors() {
        let result = reset_body().collect().await;
        assert!(result.is_err());
    }
}
