use std::time::Duration;
use tokio::net::TcpListener;
use vpn_harvest::{
    HealthPolicy, NodePayload, NodeStatus, NodeValidator, Pipeline, Protocol, SourceText,
    ValidatorConfig,
};

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_pipeline_end_to_end() {
    let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let live_port = live.local_addr().unwrap().port();
    let dead_port = closed_port().await;

    let chat = format!(
        "<p>today: ss://YWVzLTI1Ni1nY206cGFzcw==@127.0.0.1:{live}#Live<br>\
         dead: trojan://pw@127.0.0.1:{dead}?security=none#Dead</p>\
         junk: vmess://%%%% ssr://bm9wZQ",
        live = live_port,
        dead = dead_port
    );
    let repo = format!(
        "mirror of the same node `ss://YWVzLTI1Ni1nY206cGFzcw@127.0.0.1:{}#Mirror`",
        live_port
    );
    let inputs = vec![
        SourceText::new("telegram", chat),
        SourceText::new("github", repo),
    ];

    let validator = NodeValidator::new(
        ValidatorConfig::new()
            .with_parallelism(2)
            .with_timeout(Duration::from_secs(3)),
    )
    .unwrap();
    let pipeline = Pipeline::new(validator);

    let output = pipeline.run(&inputs).await;
    assert_eq!(output.stats.tokens, 4);
    assert_eq!(output.stats.parsed, 3);
    assert_eq!(output.stats.malformed, 1);
    assert_eq!(output.stats.unique, 2);
    assert_eq!(output.stats.validation.healthy, 1);
    assert_eq!(output.stats.validation.unreachable, 1);

    let live_node = &output.nodes[0];
    assert_eq!(live_node.protocol, Protocol::Shadowsocks);
    assert_eq!(live_node.status, NodeStatus::Healthy);
    assert!(live_node.ping.is_some());
    assert_eq!(
        live_node.sources,
        vec!["telegram".to_string(), "github".to_string()]
    );

    let dead_node = &output.nodes[1];
    assert_eq!(dead_node.protocol, Protocol::Trojan);
    assert_eq!(dead_node.status, NodeStatus::Unreachable);
    assert!(dead_node.ping.is_none());

    let policy = HealthPolicy::new(3_000, 90);
    let (publish, delete) = policy.partition(&output.nodes);
    assert_eq!(publish.len(), 1);
    assert_eq!(delete, vec![dead_node.id.clone()]);

    let payload = NodePayload::from(publish[0]);
    assert_eq!(payload.source, "telegram, github");
    assert!(payload.config.starts_with("ss://"));

    drop(live);
}

#[tokio::test]
async fn test_rerun_yields_same_ids() {
    let text = "vless://b831381d-6324-4d53-ad4f-8cda48b30811@127.0.0.1:9?type=tcp#A \
                ss://YWVzLTEyOC1nY206cHc@127.0.0.1:9#B";
    let inputs = vec![SourceText::new("web", text)];
    let validator = NodeValidator::new(
        ValidatorConfig::new()
            .with_parallelism(1)
            .with_timeout(Duration::from_secs(1)),
    )
    .unwrap();
    let pipeline = Pipeline::new(validator);

    let first = pipeline.run(&inputs).await;
    let second = pipeline.run(&inputs).await;
    let ids = |nodes: &[vpn_harvest::Node]| nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first.nodes), ids(&second.nodes));
    assert_eq!(first.nodes.len(), 2);
    assert!(first.nodes.iter().all(|n| n.status != NodeStatus::Unvalidated));
}
