//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! A short session against a running helper.
//!
//! Opens the bridge, asks the helper for a drone's battery level, fires an
//! asynchronous command, and waits briefly for any broadcasts before closing.
//!
//! # Running the Example
//! Start the helper on its default port (8888), then:
//! ```bash
//! RUST_LOG=helper_bridge=debug cargo run --example helper_session -- 127.0.0.1 8888
//! ```

use helper_bridge::reconnection::FixedDelay;
use helper_bridge::{Bridge, CallClass, HandlerRegistry, OpenParams, Request};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => 8888,
    };

    let handlers = HandlerRegistry::new();
    handlers.on("landed", |key| println!("broadcast: {key}"));
    handlers.on("lowBattery", |key| println!("broadcast: {key}"));

    let reconnection = FixedDelay::builder()
        .delay(Duration::from_millis(500))
        .max_attempts(Some(3))
        .build();

    let bridge = Bridge::builder()
        .with_dispatch(handlers)
        .with_reconnection(Arc::new(reconnection))
        .build()?;

    println!("Connecting to ws://{host}:{port}/api");
    if !bridge
        .open(OpenParams::new().with_host(host).with_port(port))
        .await?
    {
        eprintln!("✗ Helper did not accept the connection");
        return Ok(());
    }
    println!("✓ Connected");

    match bridge
        .request(Request::new("battery?").with_target("tello"))
        .await?
    {
        Some(reply) if reply.result => println!("✓ Battery at {}%", reply.message),
        Some(reply) => println!("✗ Helper refused: {}", reply.message),
        None => println!("✗ No answer within the budget"),
    }

    bridge
        .request(
            Request::new("takeoff")
                .with_target("tello")
                .with_class(CallClass::Async),
        )
        .await?;
    println!("✓ Takeoff sent");

    tokio::time::sleep(Duration::from_secs(2)).await;

    let snapshot = bridge.metrics().snapshot();
    println!(
        "Stats: sent={} delivered={} timeouts={} broadcasts={}",
        snapshot.frames_sent, snapshot.replies_delivered, snapshot.timeouts, snapshot.broadcasts_routed
    );

    bridge.close().await?;
    println!("✓ Closed");
    Ok(())
}
