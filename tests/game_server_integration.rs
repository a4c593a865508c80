use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use fearann::network::message::peek_header;
use fearann::network::msgs::contact::{CONTACT_CONNECTED, CONTACT_FRIEND};
use fearann::network::msgs::{
    ChatType, MsgChat, MsgCommand, MsgConnect, MsgConnectReply, MsgContactAdd, MsgContactStatus,
    MsgDelChar, MsgDelCharReply, MsgEntityCreate, MsgEntityDestroy, MsgJoin, MsgJoinReply, MsgLogin,
    MsgLoginReply, MsgNewChar, MsgNewCharReply, MsgNewUser, MsgNewUserReply, MsgPlayerData,
    MsgTimeMinute, ResultCode,
};
use fearann::network::socket::{self, LISTEN_BACKLOG};
use fearann::network::{Message, MsgType, Netlink};
use fearann::servers::game::GameState;

const WAIT: Duration = Duration::from_secs(3);

async fn start_test_server() -> (Arc<GameState>, SocketAddr) {
    let state = GameState::test_only().await.unwrap();
    let listener = socket::listen("127.0.0.1", 0, LISTEN_BACKLOG).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(GameState::serve(Arc::clone(&state), listener));
    (state, addr)
}

/// Test client speaking the wire protocol through a `Netlink`.
struct Client {
    stream: TcpStream,
    link: Netlink,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let (stream, peer) = socket::connect("127.0.0.1", addr.port()).await.unwrap();
        Self { stream, link: Netlink::new(peer) }
    }

    async fn send<M: Message>(&mut self, msg: &M) {
        self.stream.write_all(&msg.encode().unwrap()).await.unwrap();
    }

    async fn next_frame(&mut self) -> Bytes {
        loop {
            if let Some(frame) = self.link.next_frame().unwrap() {
                return frame;
            }
            let n = tokio::time::timeout(WAIT, self.link.read_from(&mut self.stream))
                .await
                .expect("no frame from the server")
                .unwrap();
            assert!(n > 0, "server closed the connection");
        }
    }

    /// Wait for the next message of type `M`, skipping the others.
    async fn expect<M: Message>(&mut self) -> M {
        loop {
            let frame = self.next_frame().await;
            let (_, msg_type) = peek_header(&frame).unwrap();
            if msg_type == M::TYPE {
                return M::decode(&frame).unwrap();
            }
        }
    }

    /// Wait for a chat line whose text satisfies `pred`.
    async fn expect_chat(&mut self, pred: impl Fn(&MsgChat) -> bool) -> MsgChat {
        loop {
            let chat: MsgChat = self.expect().await;
            if pred(&chat) {
                return chat;
            }
        }
    }

    async fn create_account(&mut self, user: &str) {
        self.send(&MsgNewUser { username: user.into(), pw_md5sum: "hash".into(), ..Default::default() })
            .await;
        let reply: MsgNewUserReply = self.expect().await;
        assert!(reply.result.is_success(), "{:?}", reply.result);
    }

    async fn login(&mut self, user: &str) -> MsgLoginReply {
        self.send(&MsgLogin { username: user.into(), pw_md5sum: "hash".into() }).await;
        self.expect().await
    }

    async fn new_char(&mut self, name: &str) -> MsgNewCharReply {
        let msg = MsgNewChar {
            charname: name.into(),
            race: "human".into(),
            gender: "m".into(),
            player_class: "fighter".into(),
            ab_con: 13,
            ab_str: 13,
            ab_dex: 13,
            ab_int: 13,
            ab_wis: 13,
            ab_cha: 13,
        };
        self.send(&msg).await;
        self.expect().await
    }

    /// Account, login, character and join in one go.
    async fn enter_world(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        let user = format!("acct_{}", name.to_lowercase());
        client.create_account(&user).await;
        assert!(client.login(&user).await.result.is_success());
        assert!(client.new_char(name).await.result.is_success());
        client.send(&MsgJoin { charname: name.into() }).await;
        let reply: MsgJoinReply = client.expect().await;
        assert!(reply.result.is_success(), "{:?}", reply.result);
        client
    }
}

async fn wait_for_connections(state: &GameState, count: usize) {
    tokio::time::timeout(WAIT, async {
        while state.login.connection_count().await != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection count not reached in time");
}

#[tokio::test]
async fn test_connect_reply() {
    let (_state, addr) = start_test_server().await;
    let mut client = Client::connect(addr).await;
    client.send(&MsgConnect).await;
    let reply: MsgConnectReply = client.expect().await;
    assert!(reply.result.is_success());
    assert_eq!(reply.protocol_version, "1");
    assert_eq!(reply.current_players, 0);
    assert!(reply.uptime.starts_with("0d 0h0m"));
}

#[tokio::test]
async fn test_account_to_world_flow() {
    let (state, addr) = start_test_server().await;
    let mut client = Client::connect(addr).await;
    client.create_account("ann").await;

    client.send(&MsgNewUser { username: "ann".into(), pw_md5sum: "x".into(), ..Default::default() }).await;
    let dup: MsgNewUserReply = client.expect().await;
    assert_eq!(dup.result, ResultCode::EUSERALREADYEXIST);

    let login = client.login("ann").await;
    assert!(login.result.is_success());
    assert!(login.characters.is_empty());

    let created = client.new_char("Ann").await;
    assert!(created.result.is_success());
    assert_eq!(created.area, "tmprotoworld");
    assert_eq!(client.new_char("Ann").await.result, ResultCode::ECHARALREADYEXIST);

    client.send(&MsgJoin { charname: "Ann".into() }).await;
    let main: MsgEntityCreate = client.expect().await;
    assert_eq!(main.entity_class, "MainPlayer");
    assert_eq!(main.entity_name, "Ann");
    let joined: MsgJoinReply = client.expect().await;
    assert!(joined.result.is_success());
    let data: MsgPlayerData = client.expect().await;
    assert!(data.health_max > 0);
    let time: MsgTimeMinute = client.expect().await;
    assert_eq!(time.gametime, 0);

    assert_eq!(state.login.playing_count().await, 1);
}

#[tokio::test]
async fn test_bad_login_and_delete() {
    let (_state, addr) = start_test_server().await;
    let mut client = Client::connect(addr).await;

    client.send(&MsgLogin { username: "nobody".into(), pw_md5sum: "hash".into() }).await;
    let reply: MsgLoginReply = client.expect().await;
    assert_eq!(reply.result, ResultCode::EBADLOGIN);

    client.create_account("bea").await;
    assert!(client.login("bea").await.result.is_success());
    assert!(client.new_char("Bea").await.result.is_success());

    client.send(&MsgDelChar { charname: "Bea".into() }).await;
    let deleted: MsgDelCharReply = client.expect().await;
    assert!(deleted.result.is_success());
    client.send(&MsgDelChar { charname: "Bea".into() }).await;
    let again: MsgDelCharReply = client.expect().await;
    assert_eq!(again.result, ResultCode::ENOSUCHCHAR);
}

#[tokio::test]
async fn test_players_see_each_other_and_chat() {
    let (_state, addr) = start_test_server().await;
    let mut ann = Client::enter_world(addr, "Ann").await;
    let mut bob = Client::enter_world(addr, "Bob").await;

    let seen: MsgEntityCreate = ann.expect().await;
    assert_eq!(seen.entity_name, "Bob");
    assert_eq!(seen.entity_class, "Player");
    ann.expect_chat(|c| c.text == "'Bob' joining the game (in 'tmprotoworld')").await;

    ann.send(&MsgChat { text: "hello there".into(), ..Default::default() }).await;
    let heard = bob.expect_chat(|c| c.chat_type == ChatType::Chat).await;
    assert_eq!(heard.origin, "Ann");
    assert_eq!(heard.text, "hello there");

    bob.send(&MsgChat { target: "Ann".into(), text: "psst".into(), ..Default::default() }).await;
    let pm = ann.expect_chat(|c| c.chat_type == ChatType::Pm).await;
    assert_eq!(pm.origin, "Bob");
    assert_eq!(pm.text, "psst");
}

#[tokio::test]
async fn test_who_command() {
    let (_state, addr) = start_test_server().await;
    let mut ann = Client::enter_world(addr, "Ann").await;
    ann.send(&MsgCommand { command: "who".into() }).await;
    let reply = ann.expect_chat(|c| c.origin == "Server" && c.text.starts_with("Total")).await;
    assert_eq!(reply.text, "Total number of players: 1\n  Ann");

    ann.send(&MsgCommand { command: "quit".into() }).await;
    let denied = ann.expect_chat(|c| c.text.starts_with("Not allowed")).await;
    assert_eq!(denied.text, "Not allowed to execute command 'quit'.");
}

#[tokio::test]
async fn test_contact_goes_offline_when_player_leaves() {
    let (state, addr) = start_test_server().await;
    let mut ann = Client::enter_world(addr, "Ann").await;
    let bob = Client::enter_world(addr, "Bob").await;

    ann.send(&MsgContactAdd { charname: "Bob".into(), contact_type: CONTACT_FRIEND, comment: "pal".into() })
        .await;
    ann.expect_chat(|c| c.text == "Info: Successfully added contact").await;
    let status: MsgContactStatus = ann.expect().await;
    assert_eq!(status.status, CONTACT_CONNECTED);

    drop(bob);
    let gone: MsgEntityDestroy = ann.expect().await;
    assert!(gone.entity_id > 0);
    ann.expect_chat(|c| c.text == "Your contact 'Bob' is off-line").await;
    ann.expect_chat(|c| c.text == "'Bob' leaving the game (in 'tmprotoworld')").await;
    wait_for_connections(&state, 1).await;
}

#[tokio::test]
async fn test_malformed_frame_disconnects() {
    let (state, addr) = start_test_server().await;
    let mut client = Client::connect(addr).await;
    wait_for_connections(&state, 1).await;

    // declared length shorter than the header
    client.stream.write_all(&[0x00, 0x03, b'C', b'o', b'n', b'n']).await.unwrap();
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(WAIT, client.stream.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(n, 0);
    wait_for_connections(&state, 0).await;
}

#[tokio::test]
async fn test_unknown_type_is_skipped() {
    let (_state, addr) = start_test_server().await;
    let mut client = Client::connect(addr).await;

    let mut frame = vec![0x00, 0x08];
    frame.extend_from_slice(&MsgType::from_tag(b"Zzzz").id().to_be_bytes());
    frame.extend_from_slice(&[1, 2]);
    client.stream.write_all(&frame).await.unwrap();

    client.send(&MsgConnect).await;
    let reply: MsgConnectReply = client.expect().await;
    assert!(reply.result.is_success());
}

#[tokio::test]
async fn test_frames_split_across_writes() {
    let (_state, addr) = start_test_server().await;
    let mut client = Client::connect(addr).await;
    let frame = MsgConnect.encode().unwrap();
    let mut both = frame.to_vec();
    both.extend_from_slice(&frame);

    client.stream.write_all(&both[..3]).await.unwrap();
    client.stream.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.stream.write_all(&both[3..]).await.unwrap();

    let first: MsgConnectReply = client.expect().await;
    let second: MsgConnectReply = client.expect().await;
    assert!(first.result.is_success());
    assert!(second.result.is_success());
}
