//! Integration tests against a loopback websocket server.

use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use stepcoach_push::{PushChannel, PushEvent, PushProtocol};
use tungstenite::Message;

fn read_text(socket: &mut tungstenite::WebSocket<std::net::TcpStream>) -> String {
    loop {
        match socket.read().expect("server read should work") {
            Message::Text(text) => return text.as_str().to_string(),
            _ => continue,
        }
    }
}

fn drain_until_closed(socket: &mut tungstenite::WebSocket<std::net::TcpStream>) {
    loop {
        match socket.read() {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        }
    }
}

#[test]
fn raw_protocol_delivers_header_and_body() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should work");
    let address = listener.local_addr().expect("local addr");
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept should work");
        let mut socket = tungstenite::accept(stream).expect("handshake should work");
        socket
            .send(Message::Text(
                r#"{"header":"Step 2","body":"Open the layers panel"}"#.into(),
            ))
            .expect("send should work");
        drain_until_closed(&mut socket);
    });

    let channel = PushChannel::new(PushProtocol::Raw);
    let (tx, rx) = mpsc::channel();
    let _subscription = channel.subscribe(move |event| {
        let _ = tx.send(event.clone());
    });
    channel
        .connect(&format!("ws://{address}"))
        .expect("connect should work");

    let event = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("event should arrive");
    assert_eq!(
        event,
        PushEvent {
            header: "Step 2".to_string(),
            body: "Open the layers panel".to_string(),
        }
    );

    channel.disconnect();
    assert!(!channel.is_connected());
    server.join().expect("server thread should finish");
}

#[test]
fn socketio_protocol_completes_handshake_and_maps_popups() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should work");
    let address = listener.local_addr().expect("local addr");
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept should work");
        let mut socket = tungstenite::accept(stream).expect("handshake should work");
        socket
            .send(Message::Text(r#"0{"sid":"s1","pingInterval":25000}"#.into()))
            .expect("open should send");
        assert_eq!(read_text(&mut socket), "40");
        socket
            .send(Message::Text(r#"40{"sid":"n1"}"#.into()))
            .expect("ack should send");
        socket.send(Message::Text("2".into())).expect("ping should send");
        assert_eq!(read_text(&mut socket), "3");
        socket
            .send(Message::Text(
                r#"42["popup_message",{"message":"Click the blue button"}]"#.into(),
            ))
            .expect("event should send");
        drain_until_closed(&mut socket);
    });

    let channel = PushChannel::new(PushProtocol::SocketIo);
    let (tx, rx) = mpsc::channel();
    let _subscription = channel.subscribe(move |event| {
        let _ = tx.send(event.clone());
    });
    channel
        .connect(&format!("http://{address}"))
        .expect("connect should work");

    let event = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("popup should arrive");
    assert_eq!(event.header, "Step");
    assert_eq!(event.body, "Click the blue button");

    channel.disconnect();
    server.join().expect("server thread should finish");
}
