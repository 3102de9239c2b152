//! Schema-checked action invocation.
//!
//! Arguments are validated against the service's SCPD before any
//! network traffic happens: a call that names an unknown action, omits
//! a declared in-argument, supplies an undeclared one, or fails value
//! coercion is rejected locally as a schema mismatch. Out-arguments are
//! decoded back into typed values in their declared order.

use upnp_description::{Action, Service, Value};
use xmltree::Element;

use crate::error::{ControlPointError, Result};

/// Invokes SOAP actions against services, validating both directions
/// against the declared schema.
#[derive(Debug, Clone, Default)]
pub struct ActionInvoker {
    client: soap_client::SoapClient,
}

impl ActionInvoker {
    pub fn new() -> Self {
        Self {
            client: soap_client::SoapClient::new(),
        }
    }

    /// Invoke an action on a service.
    ///
    /// `args` supplies the in-arguments by name, in any order; the wire
    /// payload follows the declared order. Returns the out-arguments as
    /// name/value pairs in declared order.
    pub async fn invoke(
        &self,
        service: &Service,
        action_name: &str,
        args: &[(String, Value)],
    ) -> Result<Vec<(String, Value)>> {
        let action = service.scpd.action(action_name).ok_or_else(|| {
            ControlPointError::SchemaMismatch(format!(
                "service {} declares no action {action_name}",
                service.service_type
            ))
        })?;

        let payload = build_payload(service, action, args)?;

        tracing::debug!(
            action = action_name,
            service = %service.service_type,
            control_url = %service.control_url,
            "invoking action"
        );

        let client = self.client.clone();
        let control_url = service.control_url.to_string();
        let service_type = service.service_type.clone();
        let name = action.name.clone();

        // The SOAP client is blocking by design; keep it off the runtime
        let response = tokio::task::spawn_blocking(move || {
            client.call(&control_url, &service_type, &name, &payload)
        })
        .await
        .map_err(|e| ControlPointError::Transport(format!("invocation task failed: {e}")))??;

        decode_response(service, action, &response)
    }
}

/// Validate in-arguments and render them in declared order.
fn build_payload(service: &Service, action: &Action, args: &[(String, Value)]) -> Result<String> {
    for (name, _) in args {
        if !action.in_arguments().any(|a| &a.name == name) {
            return Err(ControlPointError::SchemaMismatch(format!(
                "action {} declares no in-argument {name}",
                action.name
            )));
        }
    }

    let mut payload = String::new();
    for declared in action.in_arguments() {
        let (_, value) = args
            .iter()
            .find(|(name, _)| name == &declared.name)
            .ok_or_else(|| {
                ControlPointError::SchemaMismatch(format!(
                    "action {} is missing in-argument {}",
                    action.name, declared.name
                ))
            })?;

        let raw = value.to_string();
        if let Some(variable) = service.scpd.state_variable(&declared.related_state_variable) {
            variable.validate(&raw).map_err(|e| {
                ControlPointError::SchemaMismatch(format!("argument {}: {e}", declared.name))
            })?;
        }

        payload.push_str(&format!(
            "<{name}>{value}</{name}>",
            name = declared.name,
            value = xml_escape(&raw)
        ));
    }

    Ok(payload)
}

/// Decode out-arguments from an action response element.
fn decode_response(
    service: &Service,
    action: &Action,
    response: &Element,
) -> Result<Vec<(String, Value)>> {
    action
        .out_arguments()
        .map(|declared| {
            let raw = response
                .get_child(declared.name.as_str())
                .and_then(|c| c.get_text())
                .map(|t| t.into_owned())
                .unwrap_or_default();

            let value = match service.scpd.state_variable(&declared.related_state_variable) {
                Some(variable) => variable.data_type.coerce(&raw).map_err(|e| {
                    ControlPointError::Parse(format!(
                        "out-argument {} of {}: {e}",
                        declared.name, action.name
                    ))
                })?,
                None => Value::String(raw),
            };

            Ok((declared.name.clone(), value))
        })
        .collect()
}

fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use upnp_description::{
        AllowedRange, Argument, DataType, Direction, Scpd, StateVariable,
    };
    use url::Url;

    fn volume_service() -> Service {
        let scpd = Scpd {
            actions: vec![Action {
                name: "SetVolume".to_string(),
                arguments: vec![
                    Argument {
                        name: "InstanceID".to_string(),
                        direction: Direction::In,
                        related_state_variable: "A_ARG_TYPE_InstanceID".to_string(),
                    },
                    Argument {
                        name: "Channel".to_string(),
                        direction: Direction::In,
                        related_state_variable: "A_ARG_TYPE_Channel".to_string(),
                    },
                    Argument {
                        name: "DesiredVolume".to_string(),
                        direction: Direction::In,
                        related_state_variable: "Volume".to_string(),
                    },
                ],
            }],
            state_variables: vec![
                StateVariable {
                    name: "A_ARG_TYPE_InstanceID".to_string(),
                    data_type: DataType::Unsigned,
                    default_value: None,
                    allowed_values: Vec::new(),
                    allowed_range: None,
                    send_events: false,
                },
                StateVariable {
                    name: "A_ARG_TYPE_Channel".to_string(),
                    data_type: DataType::String,
                    default_value: None,
                    allowed_values: vec!["Master".to_string(), "LF".to_string()],
                    allowed_range: None,
                    send_events: false,
                },
                StateVariable {
                    name: "Volume".to_string(),
                    data_type: DataType::Unsigned,
                    default_value: Some("0".to_string()),
                    allowed_values: Vec::new(),
                    allowed_range: Some(AllowedRange {
                        minimum: 0.0,
                        maximum: 100.0,
                        step: Some(1.0),
                    }),
                    send_events: true,
                },
            ],
        };

        Service {
            device_udn: "uuid:test".to_string(),
            service_type: "urn:schemas-upnp-org:service:RenderingControl:1".to_string(),
            service_id: "urn:upnp-org:serviceId:RenderingControl".to_string(),
            control_url: Url::parse("http://192.168.1.50:1400/rc/control").unwrap(),
            event_sub_url: Url::parse("http://192.168.1.50:1400/rc/event").unwrap(),
            scpd_url: Url::parse("http://192.168.1.50:1400/rc.xml").unwrap(),
            scpd: Arc::new(scpd),
        }
    }

    fn set_volume_args(volume: u32) -> Vec<(String, Value)> {
        vec![
            ("InstanceID".to_string(), Value::from(0u32)),
            ("Channel".to_string(), Value::from("Master")),
            ("DesiredVolume".to_string(), Value::from(volume)),
        ]
    }

    #[test]
    fn payload_follows_declared_order() {
        let service = volume_service();
        let action = service.scpd.action("SetVolume").unwrap();

        // Supplied out of order; rendered in declared order
        let args = vec![
            ("DesiredVolume".to_string(), Value::from(30u32)),
            ("InstanceID".to_string(), Value::from(0u32)),
            ("Channel".to_string(), Value::from("Master")),
        ];

        let payload = build_payload(&service, action, &args).unwrap();
        assert_eq!(
            payload,
            "<InstanceID>0</InstanceID><Channel>Master</Channel><DesiredVolume>30</DesiredVolume>"
        );
    }

    #[rstest]
    #[case::missing_argument(vec![("InstanceID".to_string(), Value::from(0u32))])]
    #[case::unknown_argument({
        let mut args = set_volume_args(10);
        args.push(("Loudness".to_string(), Value::from(true)));
        args
    })]
    #[case::out_of_range(set_volume_args(150))]
    #[case::disallowed_channel(vec![
        ("InstanceID".to_string(), Value::from(0u32)),
        ("Channel".to_string(), Value::from("Subwoofer")),
        ("DesiredVolume".to_string(), Value::from(10u32)),
    ])]
    fn invalid_arguments_are_schema_mismatches(#[case] args: Vec<(String, Value)>) {
        let service = volume_service();
        let action = service.scpd.action("SetVolume").unwrap();

        assert!(matches!(
            build_payload(&service, action, &args),
            Err(ControlPointError::SchemaMismatch(_))
        ));
    }

    #[tokio::test]
    async fn unknown_action_fails_before_any_io() {
        let invoker = ActionInvoker::new();
        let service = volume_service();

        // control_url points nowhere reachable; a transport error here
        // would mean validation did not short-circuit
        let result = invoker.invoke(&service, "NoSuchAction", &[]).await;
        assert!(matches!(
            result,
            Err(ControlPointError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn response_values_are_typed() {
        let scpd = Scpd {
            actions: vec![Action {
                name: "GetVolume".to_string(),
                arguments: vec![Argument {
                    name: "CurrentVolume".to_string(),
                    direction: Direction::Out,
                    related_state_variable: "Volume".to_string(),
                }],
            }],
            state_variables: vec![StateVariable {
                name: "Volume".to_string(),
                data_type: DataType::Unsigned,
                default_value: None,
                allowed_values: Vec::new(),
                allowed_range: None,
                send_events: true,
            }],
        };
        let mut service = volume_service();
        service.scpd = Arc::new(scpd);
        let action = service.scpd.action("GetVolume").unwrap();

        let response = Element::parse(
            br#"<u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
                <CurrentVolume>42</CurrentVolume>
            </u:GetVolumeResponse>"# as &[u8],
        )
        .unwrap();

        let outs = decode_response(&service, action, &response).unwrap();
        assert_eq!(outs, vec![("CurrentVolume".to_string(), Value::UInt(42))]);
    }

    #[test]
    fn garbage_out_argument_is_a_parse_error() {
        let service = volume_service();
        let scpd = Scpd {
            actions: vec![Action {
                name: "GetVolume".to_string(),
                arguments: vec![Argument {
                    name: "CurrentVolume".to_string(),
                    direction: Direction::Out,
                    related_state_variable: "Volume".to_string(),
                }],
            }],
            state_variables: service.scpd.state_variables.clone(),
        };
        let mut service = service;
        service.scpd = Arc::new(scpd);
        let action = service.scpd.action("GetVolume").unwrap();

        let response = Element::parse(
            br#"<GetVolumeResponse><CurrentVolume>loud</CurrentVolume></GetVolumeResponse>"#
                as &[u8],
        )
        .unwrap();

        assert!(matches!(
            decode_response(&service, action, &response),
            Err(ControlPointError::Parse(_))
        ));
    }

    #[test]
    fn values_are_escaped_in_payload() {
        assert_eq!(xml_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }
}
