//! Subscribe to AVTransport events and print decoded LastChange values.
//!
//! Run with: cargo run --example last_change

use upnp_point::{ControlPoint, ControlPointConfig, ControlPointEvent, DiscoveryConfig};

const AV_TRANSPORT: &str = "urn:schemas-upnp-org:service:AVTransport:1";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ControlPointConfig {
        discovery: DiscoveryConfig {
            search_target: "urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };

    let (point, mut events) = ControlPoint::start(config).await?;
    println!("waiting for transport events, Ctrl-C to stop...");

    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else { break };
                match event {
                    ControlPointEvent::DeviceAppeared(device) => {
                        if device.find_service(AV_TRANSPORT).is_some() {
                            match point.subscribe(&device.udn, AV_TRANSPORT).await {
                                Ok(sid) => println!("subscribed to {} ({sid})", device.friendly_name),
                                Err(e) => eprintln!("subscribe failed: {e}"),
                            }
                        }
                    }
                    ControlPointEvent::LastChange { udn, entries, .. } => {
                        for entry in entries {
                            println!(
                                "{udn} instance {}: {} = {}",
                                entry.instance_id, entry.variable, entry.value
                            );
                        }
                    }
                    ControlPointEvent::SubscriptionExpired { udn, service_id } => {
                        eprintln!("subscription to {service_id} on {udn} expired");
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    point.shutdown().await?;
    Ok(())
}
