//! Message handlers of the bot.
//!
//! Replies are mostly logged. The session state the bot needs later (login,
//! characters, joined world) is kept in [`BotStatus`](super::BotStatus).

use std::sync::Arc;

use anyhow::Result;

use super::{AutoStep, Bot};
use crate::network::msgs::contact::CONTACT_CONNECTED;
use crate::network::msgs::{
    CharacterSummary, ChatType, MsgChat, MsgConnectReply, MsgContactStatus, MsgDelCharReply,
    MsgEntityCreate, MsgEntityDestroy, MsgEntityMove, MsgJoin, MsgJoinReply, MsgLoginReply,
    MsgNewCharReply, MsgNewUserReply, MsgPlayerData, MsgTestDataTypes, MsgTimeMinute,
};
use crate::network::MsgHdlFactory;

pub fn register_all(factory: &mut MsgHdlFactory<Arc<Bot>>) -> Result<()> {
    factory.register(on_connect_reply)?;
    factory.register(on_login_reply)?;
    factory.register(on_new_user_reply)?;
    factory.register(on_new_char_reply)?;
    factory.register(on_del_char_reply)?;
    factory.register(on_join_reply)?;
    factory.register(on_chat)?;
    factory.register(on_contact_status)?;
    factory.register(on_entity_create)?;
    factory.register(on_entity_move)?;
    factory.register(on_entity_destroy)?;
    factory.register(on_player_data)?;
    factory.register(on_time_minute)?;
    factory.register(on_test_data_types)?;
    Ok(())
}

fn chat_label(chat_type: ChatType) -> &'static str {
    match chat_type {
        ChatType::System => "SYSTEM",
        ChatType::Action => "ACTION",
        ChatType::Chat => "CHAT",
        ChatType::Pm => "PM",
    }
}

fn describe(c: &CharacterSummary) -> String {
    format!("{} ({} {} {}) in {}", c.name, c.race, c.gender, c.player_class, c.area)
}

async fn on_connect_reply(msg: MsgConnectReply, bot: Arc<Bot>) -> Result<()> {
    if !msg.result.is_success() {
        tracing::error!("Reply msg error: {}", msg.result);
        return Ok(());
    }
    tracing::info!(
        "Uptime - {} Players - {} Users - {} Chars - {} (protocol {})",
        msg.uptime,
        msg.current_players,
        msg.total_users,
        msg.total_chars,
        msg.protocol_version
    );
    if bot.auto(AutoStep::Login) {
        tracing::info!("Auto logging in...");
        bot.login_with_config().await;
    }
    Ok(())
}

async fn on_login_reply(msg: MsgLoginReply, bot: Arc<Bot>) -> Result<()> {
    if !msg.result.is_success() {
        tracing::error!("Failed to login: {}", msg.result);
        return Ok(());
    }
    let characters = msg.characters;
    let listing: Vec<String> = characters.iter().map(describe).collect();
    bot.update_status(|s| {
        s.logged_in = true;
        s.characters = characters;
    })
    .await;

    if bot.auto(AutoStep::Join) {
        tracing::info!("Auto joining in...");
        let charname = bot.config.settings.character.clone();
        bot.send_to_server(&MsgJoin { charname }).await;
        return Ok(());
    }
    tracing::info!("Login successful, {} character(s) available", listing.len());
    for line in listing {
        tracing::info!("  {}", line);
    }
    Ok(())
}

async fn on_new_user_reply(msg: MsgNewUserReply, _bot: Arc<Bot>) -> Result<()> {
    if msg.result.is_success() {
        tracing::info!("New user created");
    } else {
        tracing::error!("Failed create new user: {}", msg.result);
    }
    Ok(())
}

async fn on_new_char_reply(msg: MsgNewCharReply, bot: Arc<Bot>) -> Result<()> {
    if !msg.result.is_success() {
        tracing::error!("Failed to create character: {}", msg.result);
        return Ok(());
    }
    let created = CharacterSummary {
        name: msg.charname,
        race: msg.race,
        gender: msg.gender,
        player_class: msg.player_class,
        area: msg.area,
    };
    tracing::info!("Character created: {}", describe(&created));
    bot.update_status(|s| s.characters.push(created)).await;
    Ok(())
}

async fn on_del_char_reply(msg: MsgDelCharReply, bot: Arc<Bot>) -> Result<()> {
    if !msg.result.is_success() {
        tracing::error!("Failed to delete character: {}", msg.result);
        return Ok(());
    }
    tracing::info!("'{}' removed.", msg.charname);
    bot.update_status(|s| s.characters.retain(|c| c.name != msg.charname)).await;
    Ok(())
}

async fn on_join_reply(msg: MsgJoinReply, bot: Arc<Bot>) -> Result<()> {
    if !msg.result.is_success() {
        tracing::error!("Failed to join: {}", msg.result);
        return Ok(());
    }
    tracing::info!("You have successfully joined the world");
    bot.update_status(|s| s.joined = true).await;
    Ok(())
}

async fn on_chat(msg: MsgChat, bot: Arc<Bot>) -> Result<()> {
    tracing::info!("{} - <{}> {}", chat_label(msg.chat_type), msg.origin, msg.text);
    bot.update_status(|s| s.push_chat(msg)).await;
    Ok(())
}

async fn on_contact_status(msg: MsgContactStatus, bot: Arc<Bot>) -> Result<()> {
    tracing::debug!(
        "Receiving contact list message: {}:{}:{}:{}:{}",
        msg.charname,
        msg.contact_type as char,
        msg.status as char,
        msg.last_login,
        msg.comment
    );
    let online = msg.status == CONTACT_CONNECTED;
    tracing::info!("[bot] [contact] name={} online={}", msg.charname, online);
    bot.update_status(|s| {
        s.contacts.insert(msg.charname.clone(), msg);
    })
    .await;
    Ok(())
}

async fn on_entity_create(msg: MsgEntityCreate, bot: Arc<Bot>) -> Result<()> {
    tracing::debug!(
        "[bot] [entity_create] id={} name={} class={} area={} pos={:?}",
        msg.entity_id,
        msg.entity_name,
        msg.entity_class,
        msg.area,
        msg.position
    );
    bot.update_status(|s| {
        if msg.entity_class == "MainPlayer" {
            s.entity_id = Some(msg.entity_id);
        } else {
            s.entities.insert(msg.entity_id, msg.entity_name);
        }
    })
    .await;
    Ok(())
}

async fn on_entity_move(msg: MsgEntityMove, _bot: Arc<Bot>) -> Result<()> {
    tracing::debug!(
        "[bot] [entity_move] id={} area={} pos={:?} rot={}",
        msg.entity_id,
        msg.area,
        msg.position,
        msg.rot
    );
    Ok(())
}

async fn on_entity_destroy(msg: MsgEntityDestroy, bot: Arc<Bot>) -> Result<()> {
    let gone = bot.update_status(|s| s.entities.remove(&msg.entity_id)).await;
    tracing::debug!("[bot] [entity_destroy] id={} name={:?}", msg.entity_id, gone);
    Ok(())
}

async fn on_player_data(msg: MsgPlayerData, bot: Arc<Bot>) -> Result<()> {
    tracing::info!("Health: {}/{}", msg.health_cur, msg.health_max);
    tracing::info!("Magic: {}/{}", msg.magic_cur, msg.magic_max);
    tracing::info!("Stamina: {}", msg.stamina);
    tracing::info!("Load: {}/{}", msg.load_cur, msg.load_max);
    tracing::info!("Gold: {}", msg.gold);
    bot.update_status(|s| s.player_data = Some(msg)).await;
    Ok(())
}

async fn on_time_minute(msg: MsgTimeMinute, bot: Arc<Bot>) -> Result<()> {
    tracing::debug!("[bot] [time] minutes={}", msg.gametime);
    bot.update_status(|s| s.game_time = Some(msg.gametime)).await;
    Ok(())
}

async fn on_test_data_types(msg: MsgTestDataTypes, _bot: Arc<Bot>) -> Result<()> {
    if msg == MsgTestDataTypes::default() {
        tracing::info!("[bot] [test_msg] matches");
    } else {
        tracing::error!("[bot] [test_msg] mismatch msg={:?}", msg);
    }
    Ok(())
}
