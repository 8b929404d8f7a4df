use burrow_transport::{
    Address, ClearNetConfig, ClearNetTransportService, TransportError, TransportService,
    TransportState, TransportType,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn local_service() -> ClearNetTransportService {
    let _ = tracing_subscriber::fmt::try_init();
    ClearNetTransportService::new(ClearNetConfig {
        connect_timeout_ms: 1_000,
        ..ClearNetConfig::default()
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_loopback_round_trip() {
    let service = local_service();
    service.initialize().await.expect("init");

    let mut server = service
        .get_server_socket(0, "default")
        .await
        .expect("server socket");
    assert_eq!(server.node_id, "default");
    assert_eq!(server.address.transport_type(), TransportType::Clear);
    assert_ne!(server.address.port(), 0, "bound port is reported back");

    let (accepted, dialed) = tokio::join!(
        server.server_socket.accept(),
        service.get_socket(&server.address)
    );
    let (mut inbound, peer) = accepted.expect("accept");
    let mut outbound = dialed.expect("connect");
    assert!(peer.is_some(), "clearnet accept reports the remote address");

    outbound.write_all(b"burrow ping").await.expect("send");
    let mut buffer = [0u8; 11];
    inbound.read_exact(&mut buffer).await.expect("receive");
    assert_eq!(&buffer, b"burrow ping");

    inbound.write_all(b"burrow pong").await.expect("reply");
    outbound.read_exact(&mut buffer).await.expect("read reply");
    assert_eq!(&buffer, b"burrow pong");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_probe_reflects_listener_lifetime() {
    let service = local_service();
    service.initialize().await.expect("init");

    let server = service
        .get_server_socket(0, "default")
        .await
        .expect("server socket");
    let address = Address::new("127.0.0.1", server.address.port());
    assert!(service.is_peer_online(&address).await);

    drop(server);
    assert!(!service.is_peer_online(&address).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bootstrap_progress_climbs_through_milestones() {
    let service = local_service();
    let bootstrap = service.bootstrap_info();
    assert_eq!(bootstrap.progress(), 0.0);

    service.initialize().await.expect("init");
    assert_eq!(bootstrap.progress(), 0.25);

    let mut server = service
        .get_server_socket(0, "default")
        .await
        .expect("server socket");
    assert_eq!(bootstrap.progress(), 0.5);

    let (accepted, dialed) = tokio::join!(
        server.server_socket.accept(),
        service.get_socket(&server.address)
    );
    accepted.expect("accept");
    dialed.expect("connect");
    assert!(
        bootstrap.progress() > 0.75,
        "a live connection lifts progress past the milestone base"
    );
    assert!(bootstrap.progress() < 1.0);
}

#[tokio::test]
async fn test_shutdown_closes_the_lifecycle() {
    let service = local_service();
    service.initialize().await.expect("init");
    assert_eq!(service.state(), TransportState::Ready);

    let states = service.state_changes();
    service.shutdown().await.expect("shutdown");
    assert_eq!(service.state(), TransportState::Shutdown);
    assert_eq!(*states.borrow(), TransportState::Shutdown);

    let result = service.get_socket(&Address::new("127.0.0.1", 1)).await;
    assert!(matches!(result, Err(TransportError::NotReady(_))));
}
