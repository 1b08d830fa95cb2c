//! Wrap a function under a roomy 10-per-minute limit and call it once, then
//! race a mix of priorities through a much tighter connection and watch the
//! niceness-0 call jump the queue.

use std::time::Duration;

use connection_throttler::{throttle, Connection, RateLimit, Registry};

use futures::future::join_all;
use rand::{thread_rng, Rng};
use tokio::time::Instant;

#[tokio::main]
async fn main() {
    let registry = Registry::new();

    let conn = Connection {
        platform: "example".to_string(),
        connection_id: "conn1".to_string(),
        niceness: 1,
        rate_limit: RateLimit {
            request_count: 10,
            window_seconds: 60,
        },
    };
    let throttled = throttle(&registry, &conn, |s: &str| -> Result<String, String> {
        Ok(format!("Processed: {s}"))
    });
    match throttled.call("test").await.expect("limiter is running") {
        Ok(result) => println!("Result: {result}"),
        Err(err) => println!("Error: {err}"),
    }

    // Now a tight budget: 2 requests per second, shared by a background
    // caller (niceness 5) and an urgent one (niceness 0) on the same key.
    let tight = RateLimit {
        request_count: 2,
        window_seconds: 1,
    };
    let background_conn = Connection {
        platform: "example".to_string(),
        connection_id: "tight".to_string(),
        niceness: 5,
        rate_limit: tight,
    };
    let urgent_conn = Connection {
        niceness: 0,
        ..background_conn.clone()
    };

    let background = throttle(&registry, &background_conn, |i: u32| i * 2);
    let urgent = throttle(&registry, &urgent_conn, |i: u32| i * 2);

    let start = Instant::now();
    let mut rng = thread_rng();
    let mut tasks = vec![];
    for i in 0..6 {
        let background = background.clone();
        let payload: u32 = rng.gen_range(1..100);
        tasks.push(tokio::spawn(async move {
            let doubled = background.call(payload).await.expect("limiter is running");
            println!(
                "nice-5 call {i}: {payload} -> {doubled} at {:?}",
                Instant::now() - start
            );
        }));
    }

    // Give the background calls a head start in the queue.
    tokio::time::sleep(Duration::from_millis(100)).await;

    tasks.push(tokio::spawn(async move {
        let doubled = urgent.call(1000).await.expect("limiter is running");
        println!("nice-0 call: 1000 -> {doubled} at {:?}", Instant::now() - start);
    }));

    for task in join_all(tasks).await {
        task.expect("task should not panic");
    }

    registry.stop_all();
}
