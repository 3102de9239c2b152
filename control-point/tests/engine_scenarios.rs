//! End-to-end scenarios against mocked devices.

use std::sync::Arc;

use tokio::sync::mpsc;
use upnp_point::{
    ActionInvoker, Action, Argument, ControlPointError, DataType, Direction, Scpd, Service,
    StateVariable, Value,
};
use url::Url;

fn rendering_control_scpd() -> Scpd {
    Scpd {
        actions: vec![Action {
            name: "GetVolume".to_string(),
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
                    name: "CurrentVolume".to_string(),
                    direction: Direction::Out,
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
                allowed_values: vec!["Master".to_string()],
                allowed_range: None,
                send_events: false,
            },
            StateVariable {
                name: "Volume".to_string(),
                data_type: DataType::Unsigned,
                default_value: None,
                allowed_values: Vec::new(),
                allowed_range: None,
                send_events: true,
            },
        ],
    }
}

fn service_at(base: &str) -> Service {
    Service {
        device_udn: "uuid:test-renderer".to_string(),
        service_type: "urn:schemas-upnp-org:service:RenderingControl:1".to_string(),
        service_id: "urn:upnp-org:serviceId:RenderingControl".to_string(),
        control_url: Url::parse(&format!("{base}/rc/control")).unwrap(),
        event_sub_url: Url::parse(&format!("{base}/rc/event")).unwrap(),
        scpd_url: Url::parse(&format!("{base}/rc.xml")).unwrap(),
        scpd: Arc::new(rendering_control_scpd()),
    }
}

fn get_volume_args() -> Vec<(String, Value)> {
    vec![
        ("InstanceID".to_string(), Value::from(0u32)),
        ("Channel".to_string(), Value::from("Master")),
    ]
}

#[tokio::test]
async fn get_volume_round_trip() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/rc/control")
        .match_header(
            "soapaction",
            "\"urn:schemas-upnp-org:service:RenderingControl:1#GetVolume\"",
        )
        .with_status(200)
        .with_body(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
                        <CurrentVolume>37</CurrentVolume>
                    </u:GetVolumeResponse>
                </s:Body>
            </s:Envelope>"#,
        )
        .create_async()
        .await;

    let invoker = ActionInvoker::new();
    let service = service_at(&server.url());

    let outs = invoker
        .invoke(&service, "GetVolume", &get_volume_args())
        .await
        .unwrap();

    assert_eq!(outs, vec![("CurrentVolume".to_string(), Value::UInt(37))]);
    mock.assert_async().await;
}

#[tokio::test]
async fn upnp_fault_surfaces_code_and_description() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/rc/control")
        .with_status(500)
        .with_body(
            r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
                <s:Body>
                    <s:Fault>
                        <faultcode>s:Client</faultcode>
                        <faultstring>UPnPError</faultstring>
                        <detail>
                            <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
                                <errorCode>402</errorCode>
                                <errorDescription>Invalid Args</errorDescription>
                            </UPnPError>
                        </detail>
                    </s:Fault>
                </s:Body>
            </s:Envelope>"#,
        )
        .create_async()
        .await;

    let invoker = ActionInvoker::new();
    let service = service_at(&server.url());

    let err = invoker
        .invoke(&service, "GetVolume", &get_volume_args())
        .await
        .unwrap_err();

    match err {
        ControlPointError::ProtocolFault { code, description } => {
            assert_eq!(code, 402);
            assert_eq!(description, "Invalid Args");
        }
        other => panic!("expected ProtocolFault, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn schema_mismatch_never_reaches_the_device() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/rc/control")
        .expect(0)
        .create_async()
        .await;

    let invoker = ActionInvoker::new();
    let service = service_at(&server.url());

    // Channel "Subwoofer" is outside the allowed value list
    let args = vec![
        ("InstanceID".to_string(), Value::from(0u32)),
        ("Channel".to_string(), Value::from("Subwoofer")),
    ];

    let err = invoker
        .invoke(&service, "GetVolume", &args)
        .await
        .unwrap_err();
    assert!(matches!(err, ControlPointError::SchemaMismatch(_)));

    mock.assert_async().await;
}

#[tokio::test]
async fn notify_routing_honors_registration() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = callback_server::CallbackServer::new((50700, 50800), tx)
        .await
        .unwrap();

    server.router().register("uuid:sub-1".to_string()).await;

    let body = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
        <e:property><Volume>25</Volume></e:property>
    </e:propertyset>"#;

    let url = format!("{}/", server.base_url());
    let agent = ureq::agent();

    // Registered SID is accepted and routed
    let response = tokio::task::spawn_blocking({
        let url = url.clone();
        let agent = agent.clone();
        move || {
            agent
                .request("NOTIFY", &url)
                .set("SID", "uuid:sub-1")
                .set("NT", "upnp:event")
                .set("NTS", "upnp:propchange")
                .send_string(body)
        }
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.status(), 200);

    let notification = rx.recv().await.unwrap();
    assert_eq!(notification.subscription_id, "uuid:sub-1");
    let changes = upnp_point::parse_property_set(&notification.event_xml).unwrap();
    assert_eq!(changes[0].variable, "Volume");
    assert_eq!(changes[0].value, "25");

    // Unknown SID gets 412 Precondition Failed
    let status = tokio::task::spawn_blocking({
        let url = url.clone();
        let agent = agent.clone();
        move || {
            match agent
                .request("NOTIFY", &url)
                .set("SID", "uuid:unknown")
                .send_string(body)
            {
                Ok(r) => r.status(),
                Err(ureq::Error::Status(code, _)) => code,
                Err(e) => panic!("unexpected transport error: {e}"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(status, 412);

    // Missing SID gets 412 as well
    let status = tokio::task::spawn_blocking(move || {
        match agent.request("NOTIFY", &url).send_string(body) {
            Ok(r) => r.status(),
            Err(ureq::Error::Status(code, _)) => code,
            Err(e) => panic!("unexpected transport error: {e}"),
        }
    })
    .await
    .unwrap();
    assert_eq!(status, 412);

    server.shutdown().await;
}
