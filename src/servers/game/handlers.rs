//! Message handlers of the game server.

use anyhow::Result;

use super::ConnCtx;
use crate::network::msgs::{
    MsgChat, MsgCommand, MsgConnect, MsgContactAdd, MsgContactDel, MsgDelChar, MsgEntityMove,
    MsgJoin, MsgLogin, MsgNewChar, MsgNewUser,
};
use crate::network::MsgHdlFactory;

pub fn register_all(factory: &mut MsgHdlFactory<ConnCtx>) -> Result<()> {
    factory.register(on_connect)?;
    factory.register(on_login)?;
    factory.register(on_new_user)?;
    factory.register(on_new_char)?;
    factory.register(on_del_char)?;
    factory.register(on_join)?;
    factory.register(on_chat)?;
    factory.register(on_command)?;
    factory.register(on_contact_add)?;
    factory.register(on_contact_del)?;
    factory.register(on_entity_move)?;
    Ok(())
}

async fn on_connect(_msg: MsgConnect, ctx: ConnCtx) -> Result<()> {
    ctx.state.send_connect_reply(ctx.conn).await;
    Ok(())
}

async fn on_login(msg: MsgLogin, ctx: ConnCtx) -> Result<()> {
    ctx.state.login(ctx.conn, msg).await;
    Ok(())
}

async fn on_new_user(msg: MsgNewUser, ctx: ConnCtx) -> Result<()> {
    ctx.state.create_user(ctx.conn, msg).await;
    Ok(())
}

async fn on_new_char(msg: MsgNewChar, ctx: ConnCtx) -> Result<()> {
    ctx.state.create_character(ctx.conn, msg).await;
    Ok(())
}

async fn on_del_char(msg: MsgDelChar, ctx: ConnCtx) -> Result<()> {
    ctx.state.delete_character(ctx.conn, msg).await;
    Ok(())
}

async fn on_join(msg: MsgJoin, ctx: ConnCtx) -> Result<()> {
    ctx.state.join_game(ctx.conn, msg).await;
    Ok(())
}

async fn on_chat(msg: MsgChat, ctx: ConnCtx) -> Result<()> {
    ctx.state.process_chat(ctx.conn, msg).await;
    Ok(())
}

async fn on_command(msg: MsgCommand, ctx: ConnCtx) -> Result<()> {
    ctx.state.process_command(ctx.conn, msg).await;
    Ok(())
}

async fn on_contact_add(msg: MsgContactAdd, ctx: ConnCtx) -> Result<()> {
    ctx.state.add_contact(ctx.conn, msg).await;
    Ok(())
}

async fn on_contact_del(msg: MsgContactDel, ctx: ConnCtx) -> Result<()> {
    ctx.state.remove_contact(ctx.conn, msg).await;
    Ok(())
}

async fn on_entity_move(msg: MsgEntityMove, ctx: ConnCtx) -> Result<()> {
    ctx.state.update_movement(ctx.conn, msg).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::msgs::MsgTestDataTypes;
    use crate::network::{Message, MsgType};

    #[tokio::test]
    async fn test_server_handlers_registered() {
        let state = crate::servers::game::GameState::test_only().await.unwrap();
        for tag in [b"Conn", b"Logi", b"NUsr", b"NCha", b"DCha", b"Join", b"Chat", b"Cmmd", b"CtAd", b"CtDl", b"EnMv"] {
            assert!(state.factory.is_registered(MsgType::from_tag(tag)), "{:?}", tag);
        }
        assert_eq!(state.factory.len(), 11);
        assert!(!state.factory.is_registered(MsgTestDataTypes::TYPE));
    }

    #[tokio::test]
    async fn test_connect_frame_dispatch() {
        let state = crate::servers::game::GameState::test_only().await.unwrap();
        let (conn, mut rx) = state.add_connection("127.0.0.1:9100".parse().unwrap()).await;
        let frame = MsgConnect.encode().unwrap();
        let ctx = ConnCtx { state: state.clone(), conn };
        let handled = state.factory.handle_stream(&frame, ctx).await.unwrap();
        assert_eq!(handled, MsgConnect::TYPE);
        let reply = rx.try_recv().unwrap();
        assert!(crate::network::msgs::MsgConnectReply::decode(&reply).unwrap().result.is_success());
    }
}
