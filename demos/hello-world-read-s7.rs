// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Polls two flag words of an S7-1500 once per second.

use std::time::Duration;

use tokio_plc::prelude::*;

const POLL_CYCLES: usize = 9;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let manager = DriverManager::new();
    let connection = manager
        .connect("s7://192.168.216.121?remote-rack=0&remote-slot=1&controller-type=S7_1500")
        .await?;

    let request = connection
        .read_request_builder()
        .add_query("field_MW8", "%M8:INT")
        .add_query("field_MW10", "%M10:INT")
        // .add_query("field_Q0_0", "%Q0.0:BOOL")
        // .add_query("field_I0_0", "%I0.0:BOOL")
        .build()?;

    for _ in 0..POLL_CYCLES {
        let response = match request.execute().await {
            Ok(response) => response,
            Err(err) => {
                eprintln!("Failed to read: {err}");
                break;
            }
        };
        for (name, item) in response.iter() {
            match item.value() {
                Some(value) if item.code().is_ok() => println!("{name}: {value}"),
                _ => println!("{name}: non-ok response code {}", item.code()),
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    connection.close().await?;

    Ok(())
}
