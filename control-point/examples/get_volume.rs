//! Discover media renderers and print their current volume.
//!
//! Run with: cargo run --example get_volume

use upnp_point::{ControlPoint, ControlPointConfig, ControlPointEvent, DiscoveryConfig, Value};

const RENDERING_CONTROL: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

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
    println!("searching for media renderers, Ctrl-C to stop...");

    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else { break };
                if let ControlPointEvent::DeviceAppeared(device) = event {
                    if device.find_service(RENDERING_CONTROL).is_none() {
                        continue;
                    }

                    let args = [
                        ("InstanceID".to_string(), Value::from(0u32)),
                        ("Channel".to_string(), Value::from("Master")),
                    ];
                    match point.invoke(&device.udn, RENDERING_CONTROL, "GetVolume", &args).await {
                        Ok(outs) => {
                            for (name, value) in outs {
                                println!("{}: {name} = {value}", device.friendly_name);
                            }
                        }
                        Err(e) => eprintln!("{}: GetVolume failed: {e}", device.friendly_name),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    point.shutdown().await?;
    Ok(())
}
