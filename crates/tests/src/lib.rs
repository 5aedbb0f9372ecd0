//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 真实 loopback TCP / Unix socket 上的完整接收流程
//! - 扁平与分层两种终止语义
//! - 接收节点 -> Dispatcher -> Sink 的落盘链路

#[cfg(test)]
mod support {
    use std::time::Duration;

    use contracts::{DestinationTag, Delivery, Endpoint, Item};
    use protocol::frame::{self, FrameLimits};
    use receiver::{Listener, Receiver, ReceiverReport, Result};
    use tokio::io::{AsyncRead, AsyncWrite};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    /// Upstream sender speaking the wire protocol
    pub struct Peer<S> {
        pub stream: S,
        pub destinations: Vec<DestinationTag>,
    }

    impl<S: AsyncRead + AsyncWrite + Unpin> Peer<S> {
        /// Handshake on a freshly connected stream
        pub async fn handshake(mut stream: S, group: &str) -> Self {
            frame::write_handshake_request(&mut stream, group).await.unwrap();
            let destinations = frame::read_handshake_reply(&mut stream, &FrameLimits::default())
                .await
                .unwrap();
            Self {
                stream,
                destinations,
            }
        }

        pub async fn send_batch(&mut self, items: &[Item]) {
            frame::write_batch_header(&mut self.stream, items.len() as i32)
                .await
                .unwrap();
            frame::read_ack(&mut self.stream).await.unwrap();
            for item in items {
                frame::write_item_frame(&mut self.stream, item).await.unwrap();
            }
        }

        pub async fn finish(&mut self, source_id: i32) {
            frame::write_batch_header(&mut self.stream, 1).await.unwrap();
            frame::read_ack(&mut self.stream).await.unwrap();
            frame::write_end_of_stream(&mut self.stream, source_id)
                .await
                .unwrap();
        }
    }

    pub async fn tcp_peer(addr: std::net::SocketAddr, group: &str) -> Peer<tokio::net::TcpStream> {
        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        Peer::handshake(stream, group).await
    }

    pub fn outputs(n: usize) -> (Vec<mpsc::Sender<Delivery>>, Vec<mpsc::Receiver<Delivery>>) {
        (0..n).map(|_| mpsc::channel(256)).unzip()
    }

    /// Bind loopback TCP on an ephemeral port and serve in the background
    pub async fn serve_tcp<P>(
        receiver: Receiver<P>,
    ) -> (std::net::SocketAddr, JoinHandle<Result<ReceiverReport>>)
    where
        P: receiver::ClassificationPolicy + 'static,
    {
        let listener = Listener::bind(&Endpoint::network("127.0.0.1:0"), 16)
            .await
            .unwrap();
        let addr = listener.local_endpoint().socket_addr().unwrap();
        (addr, tokio::spawn(receiver.serve(listener)))
    }

    /// Everything currently queued on an output channel
    pub fn drain(rx: &mut mpsc::Receiver<Delivery>) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Ok(d) = rx.try_recv() {
            out.push(d);
        }
        out
    }

    pub fn payloads(deliveries: &[Delivery]) -> Vec<Vec<u8>> {
        deliveries
            .iter()
            .filter_map(|d| match d {
                Delivery::Item(item) => Some(item.payload.to_vec()),
                Delivery::EndOfStream => None,
            })
            .collect()
    }

    pub fn eos_count(deliveries: &[Delivery]) -> usize {
        deliveries.iter().filter(|d| d.is_end_of_stream()).count()
    }

    pub async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod flat_tests {
    use contracts::{Endpoint, Item, RoutingTable};
    use receiver::{Receiver, ReceiverConfig, ReceiverState};

    use crate::support::*;

    fn config(input_channels: usize) -> ReceiverConfig {
        ReceiverConfig::new(Endpoint::network("127.0.0.1:0"), input_channels)
    }

    #[tokio::test]
    async fn test_each_output_terminated_once_after_all_senders_finish() {
        let (tx, mut rx) = outputs(3);
        let routing: RoutingTable = [(1, 0), (2, 2)].into_iter().collect();
        let receiver = Receiver::flat(config(3), routing, tx).unwrap();
        let (addr, handle) = serve_tcp(receiver).await;

        let mut peers = Vec::new();
        for group in ["A", "B", "C"] {
            let peer = tcp_peer(addr, group).await;
            assert_eq!(peer.destinations, vec![1, 2]);
            peers.push(peer);
        }

        for (source_id, peer) in peers.iter_mut().enumerate() {
            peer.send_batch(&[Item::new(source_id as i32, 2, vec![source_id as u8])])
                .await;
        }
        for (source_id, peer) in peers.iter_mut().enumerate() {
            peer.finish(source_id as i32).await;
        }

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.final_state, ReceiverState::Stopped);
        assert_eq!(report.end_of_stream, 3);
        assert_eq!(report.items_per_channel, vec![0, 0, 3]);

        for rx in rx.iter_mut() {
            let deliveries = drain(rx);
            assert_eq!(eos_count(&deliveries), 1);
            assert!(deliveries.last().unwrap().is_end_of_stream());
        }
    }

    #[tokio::test]
    async fn test_untagged_items_round_robin_in_arrival_order() {
        let (tx, mut rx) = outputs(3);
        let receiver = Receiver::flat(config(1), RoutingTable::new(), tx).unwrap();
        let (addr, handle) = serve_tcp(receiver).await;

        let mut peer = tcp_peer(addr, "A").await;
        assert!(peer.destinations.is_empty());
        let items: Vec<Item> = (0u8..6).map(|i| Item::new(0, -1, vec![i])).collect();
        peer.send_batch(&items[..4]).await;
        peer.send_batch(&items[4..]).await;
        peer.finish(0).await;

        handle.await.unwrap().unwrap();
        assert_eq!(payloads(&drain(&mut rx[0])), vec![vec![0], vec![3]]);
        assert_eq!(payloads(&drain(&mut rx[1])), vec![vec![1], vec![4]]);
        assert_eq!(payloads(&drain(&mut rx[2])), vec![vec![2], vec![5]]);
    }

    #[tokio::test]
    async fn test_tagged_items_follow_routing_table() {
        let (tx, mut rx) = outputs(2);
        let routing: RoutingTable = [(10, 1), (20, 0)].into_iter().collect();
        let receiver = Receiver::flat(config(1), routing, tx).unwrap();
        let (addr, handle) = serve_tcp(receiver).await;

        let mut peer = tcp_peer(addr, "A").await;
        peer.send_batch(&[
            Item::new(4, 10, &b"a"[..]),
            Item::new(4, 20, &b"b"[..]),
            Item::new(4, 10, &b"c"[..]),
        ])
        .await;
        peer.finish(4).await;

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.items_per_channel, vec![1, 2]);
        assert_eq!(payloads(&drain(&mut rx[0])), vec![b"b".to_vec()]);
        assert_eq!(
            payloads(&drain(&mut rx[1])),
            vec![b"a".to_vec(), b"c".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_truncated_batch_retires_connection_without_counting() {
        let (tx, mut rx) = outputs(1);
        let receiver = Receiver::flat(config(1), RoutingTable::new(), tx).unwrap();
        let (addr, handle) = serve_tcp(receiver).await;

        let mut broken = tcp_peer(addr, "A").await;
        protocol::frame::write_batch_header(&mut broken.stream, 3)
            .await
            .unwrap();
        protocol::frame::read_ack(&mut broken.stream).await.unwrap();
        protocol::frame::write_item_frame(&mut broken.stream, &Item::new(1, -1, &b"x"[..]))
            .await
            .unwrap();
        drop(broken);
        settle().await;

        let mut good = tcp_peer(addr, "B").await;
        good.finish(2).await;

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.connections_accepted, 2);
        assert_eq!(report.connections_failed, 1);
        assert_eq!(report.end_of_stream, 1);
        assert_eq!(report.items_forwarded(), 1);

        let deliveries = drain(&mut rx[0]);
        assert_eq!(payloads(&deliveries), vec![b"x".to_vec()]);
        assert_eq!(eos_count(&deliveries), 1);
    }

    #[tokio::test]
    async fn test_late_connection_counts_like_any_other() {
        let (tx, _rx) = outputs(1);
        let receiver = Receiver::flat(config(2), RoutingTable::new(), tx).unwrap();
        let (addr, handle) = serve_tcp(receiver).await;

        let mut first = tcp_peer(addr, "A").await;
        first.finish(0).await;
        settle().await;
        assert!(!handle.is_finished());

        let mut second = tcp_peer(addr, "B").await;
        second.finish(1).await;

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.end_of_stream, 2);
    }
}

#[cfg(test)]
mod hierarchical_tests {
    use std::collections::BTreeSet;

    use contracts::{Delivery, Endpoint, Item, RoutingTable};
    use receiver::{Receiver, ReceiverConfig};

    use crate::support::*;

    #[tokio::test]
    async fn test_classes_terminate_their_own_channels() {
        // channels 0 and 1 are external, 2 is reserved internal
        let (tx, mut rx) = outputs(3);
        let routing: RoutingTable = [(7, 1)].into_iter().collect();
        let receiver = Receiver::hierarchical(
            ReceiverConfig::new(Endpoint::network("127.0.0.1:0"), 5),
            routing,
            vec![42],
            BTreeSet::from(["G1".to_string()]),
            tx,
        )
        .unwrap();
        let (addr, handle) = serve_tcp(receiver).await;

        let mut internal = Vec::new();
        for _ in 0..2 {
            let peer = tcp_peer(addr, "G1").await;
            assert_eq!(peer.destinations, vec![42]);
            internal.push(peer);
        }
        let mut external = Vec::new();
        for group in ["E1", "E2", "E3"] {
            let peer = tcp_peer(addr, group).await;
            assert_eq!(peer.destinations, vec![7]);
            external.push(peer);
        }

        internal[0]
            .send_batch(&[Item::new(100, 7, &b"int"[..])])
            .await;
        external[0]
            .send_batch(&[
                Item::new(1, 7, &b"tagged"[..]),
                Item::new(1, -1, &b"rr0"[..]),
                Item::new(1, -1, &b"rr1"[..]),
            ])
            .await;

        for (i, peer) in external.iter_mut().enumerate() {
            peer.finish(i as i32 + 1).await;
        }
        settle().await;

        // externals done: channels 0 and 1 terminated, internal channel still open
        let ch0 = drain(&mut rx[0]);
        let ch1 = drain(&mut rx[1]);
        assert_eq!(payloads(&ch0), vec![b"rr0".to_vec()]);
        assert_eq!(payloads(&ch1), vec![b"tagged".to_vec(), b"rr1".to_vec()]);
        assert_eq!(eos_count(&ch0), 1);
        assert_eq!(eos_count(&ch1), 1);
        let ch2 = drain(&mut rx[2]);
        assert_eq!(payloads(&ch2), vec![b"int".to_vec()]);
        assert_eq!(eos_count(&ch2), 0);

        internal[1]
            .send_batch(&[Item::new(101, -1, &b"late"[..])])
            .await;
        for (i, peer) in internal.iter_mut().enumerate() {
            peer.finish(100 + i as i32).await;
        }

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.handshakes_internal, 2);
        assert_eq!(report.handshakes_external, 3);
        assert_eq!(report.end_of_stream, 5);
        assert_eq!(report.terminated_channels, vec![0, 1, 2]);

        let ch2 = drain(&mut rx[2]);
        assert_eq!(payloads(&ch2), vec![b"late".to_vec()]);
        assert!(matches!(ch2.last(), Some(Delivery::EndOfStream)));
        assert!(drain(&mut rx[0]).is_empty());
        assert!(drain(&mut rx[1]).is_empty());
    }

    #[test]
    fn test_blueprint_with_one_output_is_rejected() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            r#"
[receiver]
input_channels = 1

[receiver.endpoint]
transport = "network"
address = "127.0.0.1:0"

[hierarchical]
internal_groups = ["G1"]

[[outputs]]
name = "only"
sink_type = "log"
"#,
            config_loader::ConfigFormat::Toml,
        );
        assert!(blueprint.is_err());
    }
}

#[cfg(test)]
mod pipeline_tests {
    use std::fs;

    use contracts::Item;
    use receiver::{Listener, Receiver};
    use tokio::net::UnixStream;

    use crate::support::*;

    fn blueprint_toml(socket: &str, out_dir: &str) -> String {
        format!(
            r#"
[receiver]
input_channels = 2
max_payload_bytes = 1024

[receiver.endpoint]
transport = "local"
address = "{socket}"

[[routing]]
tag = 1
channel = 0

[[outputs]]
name = "disk"
sink_type = "file"
queue_capacity = 4

[outputs.params]
base_path = "{out_dir}"

[[outputs]]
name = "log"
sink_type = "log"
"#
        )
    }

    #[tokio::test]
    async fn test_unix_socket_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("dreceiver.sock");
        let out_dir = dir.path().join("out");
        let blueprint = config_loader::ConfigLoader::load_from_str(
            &blueprint_toml(&socket.to_string_lossy(), &out_dir.to_string_lossy()),
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let dispatcher = dispatcher::create_dispatcher(blueprint.outputs.clone())
            .await
            .unwrap();
        let receiver = Receiver::from_blueprint(&blueprint, dispatcher.senders()).unwrap();
        let listener = Listener::bind(&blueprint.receiver.endpoint, blueprint.receiver.backlog)
            .await
            .unwrap();
        assert!(socket.exists());
        let handle = tokio::spawn(receiver.serve(listener));

        let mut a = Peer::handshake(UnixStream::connect(&socket).await.unwrap(), "A").await;
        let mut b = Peer::handshake(UnixStream::connect(&socket).await.unwrap(), "B").await;
        assert_eq!(a.destinations, vec![1]);

        a.send_batch(&[Item::new(5, 1, &b"first"[..]), Item::new(5, 1, &b"second"[..])])
            .await;
        b.send_batch(&[Item::new(6, -1, &b"generic"[..])]).await;
        a.finish(5).await;
        b.finish(6).await;

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.items_forwarded(), 3);
        assert!(!socket.exists());

        let sinks = dispatcher.shutdown().await;
        assert_eq!(sinks[0].0, "disk");
        assert_eq!(sinks[0].1.eos_count, 1);
        assert_eq!(sinks[1].1.eos_count, 1);
        // generic round-robin starts at channel 0
        assert_eq!(sinks[0].1.write_count + sinks[1].1.write_count, 3);

        let mut stored: Vec<(u64, Vec<u8>)> = fs::read_dir(out_dir.join("5"))
            .unwrap()
            .map(|entry| {
                let path = entry.unwrap().path();
                let seq = path.file_stem().unwrap().to_str().unwrap().parse().unwrap();
                (seq, fs::read(&path).unwrap())
            })
            .collect();
        stored.sort();
        let contents: Vec<Vec<u8>> = stored.into_iter().map(|(_, bytes)| bytes).collect();
        assert_eq!(contents, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(
            fs::read_to_string(out_dir.join("EOS")).unwrap(),
            sinks[0].1.write_count.to_string()
        );
    }

    #[tokio::test]
    async fn test_oversized_payload_retires_connection() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("limits.sock");
        let out_dir = dir.path().join("out");
        let blueprint = config_loader::ConfigLoader::load_from_str(
            &blueprint_toml(&socket.to_string_lossy(), &out_dir.to_string_lossy()),
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let (tx, _rx) = outputs(2);
        let receiver = Receiver::from_blueprint(&blueprint, tx).unwrap();
        let listener = Listener::bind(&blueprint.receiver.endpoint, 8).await.unwrap();
        let handle = tokio::spawn(receiver.serve(listener));

        let mut big = Peer::handshake(UnixStream::connect(&socket).await.unwrap(), "A").await;
        protocol::frame::write_batch_header(&mut big.stream, 1)
            .await
            .unwrap();
        protocol::frame::read_ack(&mut big.stream).await.unwrap();
        // payload over max_payload_bytes; the receiver closes without reading it
        let _ = protocol::frame::write_item_frame(&mut big.stream, &Item::new(1, 1, vec![0u8; 4096]))
            .await;
        settle().await;

        for source_id in [2, 3] {
            let mut peer =
                Peer::handshake(UnixStream::connect(&socket).await.unwrap(), "B").await;
            peer.finish(source_id).await;
        }

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.connections_failed, 1);
        assert_eq!(report.items_forwarded(), 0);
        assert_eq!(report.end_of_stream, 2);
    }
}
