use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::Row;

use super::{
    AccountRecord, CharacterBrief, CharacterRecord, CharacterSave, CharacterStats, ContactLink,
    GameStore, NewAccount, NewCharacter, StoreResult,
};
use crate::config::SqlConfig;
use crate::network::msgs::CharacterSummary;
use crate::network::Vector3;

/// `usr_chars.status` of characters still in use.
const STATUS_ACTIVE: i32 = 0;
/// `usr_chars.status` after deletion. The row stays so the name remains taken.
const STATUS_DELETED: i32 = 1;

/// Single row of the `world` table.
const WORLD_ID: i32 = 1;

const CONTACT_SELECT: &str = "SELECT o.`cid`, o.`charname`, c.`cid`, c.`charname`, l.`type`, l.`comment`,
            CAST(c.`last_login` AS CHAR)
     FROM `contact_list` l
     JOIN `usr_chars` o ON o.`cid` = l.`cid`
     JOIN `usr_chars` c ON c.`cid` = l.`contact_cid`";

type ContactRow = (u64, String, u64, String, String, String, Option<String>);

fn contact_link(row: ContactRow) -> ContactLink {
    let (owner_cid, owner_name, contact_cid, contact_name, kind, comment, last_login) = row;
    ContactLink {
        owner_cid,
        owner_name,
        contact_cid,
        contact_name,
        contact_type: kind.bytes().next().unwrap_or(b' '),
        comment,
        last_login: last_login.unwrap_or_default(),
    }
}

fn character_record(row: &MySqlRow) -> Result<CharacterRecord, sqlx::Error> {
    Ok(CharacterRecord {
        cid: row.try_get("cid")?,
        uid: row.try_get("uid")?,
        name: row.try_get("charname")?,
        race: row.try_get("race")?,
        gender: row.try_get("gender")?,
        player_class: row.try_get("class")?,
        area: row.try_get("area")?,
        position: Vector3::new(row.try_get("pos1")?, row.try_get("pos2")?, row.try_get("pos3")?),
        rot: row.try_get("rot")?,
        roles: row.try_get("roles")?,
        stats: CharacterStats {
            health: row.try_get("health")?,
            magic: row.try_get("magic")?,
            stamina: row.try_get("stamina")?,
            gold: row.try_get("gold")?,
            level: row.try_get("level")?,
            ab_con: row.try_get("ab_con")?,
            ab_str: row.try_get("ab_str")?,
            ab_dex: row.try_get("ab_dex")?,
            ab_int: row.try_get("ab_int")?,
            ab_wis: row.try_get("ab_wis")?,
            ab_cha: row.try_get("ab_cha")?,
        },
    })
}

/// MySQL backed store.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub async fn connect(config: &SqlConfig) -> StoreResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(&config.url())
            .await?;
        tracing::info!(
            "[db] [connected] host={}:{} database={}",
            config.host,
            config.port,
            config.database
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create missing tables.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

impl GameStore for MySqlStore {
    fn count_accounts(&self) -> BoxFuture<'_, StoreResult<u64>> {
        async move {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM `usr_accts`")
                .fetch_one(&self.pool)
                .await?;
            Ok(n.max(0) as u64)
        }
        .boxed()
    }

    fn count_characters(&self) -> BoxFuture<'_, StoreResult<u64>> {
        async move {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM `usr_chars` WHERE `status` = ?")
                .bind(STATUS_ACTIVE)
                .fetch_one(&self.pool)
                .await?;
            Ok(n.max(0) as u64)
        }
        .boxed()
    }

    fn find_account<'a>(
        &'a self,
        username: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<AccountRecord>>> {
        async move {
            let row: Option<(u64, String, String, i32)> = sqlx::query_as(
                "SELECT `uid`, `username`, `password`, `roles` FROM `usr_accts` WHERE `username` = ?",
            )
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(uid, username, password, roles)| AccountRecord {
                uid,
                username,
                password,
                roles,
            }))
        }
        .boxed()
    }

    fn create_account<'a>(&'a self, account: &'a NewAccount) -> BoxFuture<'a, StoreResult<u64>> {
        async move {
            let res = sqlx::query(
                "INSERT INTO `usr_accts` (`username`, `password`, `email`, `realname`, `roles`)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&account.username)
            .bind(&account.password)
            .bind(&account.email)
            .bind(&account.realname)
            .bind(account.roles)
            .execute(&self.pool)
            .await?;
            Ok(res.last_insert_id())
        }
        .boxed()
    }

    fn record_login<'a>(&'a self, uid: u64, ip: &'a str) -> BoxFuture<'a, StoreResult<()>> {
        async move {
            sqlx::query(
                "UPDATE `usr_accts` SET `last_login` = NOW(), `last_login_ip` = ?,
                 `number_logins` = `number_logins` + 1 WHERE `uid` = ?",
            )
            .bind(ip)
            .bind(uid)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
        .boxed()
    }

    fn list_characters(&self, uid: u64) -> BoxFuture<'_, StoreResult<Vec<CharacterSummary>>> {
        async move {
            let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
                "SELECT `charname`, `race`, `gender`, `class`, `area` FROM `usr_chars`
                 WHERE `uid` = ? AND `status` = ? ORDER BY `cid`",
            )
            .bind(uid)
            .bind(STATUS_ACTIVE)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|(name, race, gender, player_class, area)| CharacterSummary {
                    name,
                    race,
                    gender,
                    player_class,
                    area,
                })
                .collect())
        }
        .boxed()
    }

    fn character_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, StoreResult<bool>> {
        async move {
            let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM `usr_chars` WHERE `charname` = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
            Ok(n > 0)
        }
        .boxed()
    }

    fn count_active_characters(&self, uid: u64) -> BoxFuture<'_, StoreResult<u64>> {
        async move {
            let (n,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM `usr_chars` WHERE `uid` = ? AND `status` = ?")
                    .bind(uid)
                    .bind(STATUS_ACTIVE)
                    .fetch_one(&self.pool)
                    .await?;
            Ok(n.max(0) as u64)
        }
        .boxed()
    }

    fn create_character<'a>(&'a self, c: &'a NewCharacter) -> BoxFuture<'a, StoreResult<u64>> {
        async move {
            let mut tx = self.pool.begin().await?;
            let res = sqlx::query(
                "INSERT INTO `usr_chars` (`uid`, `charname`, `race`, `gender`, `class`, `area`,
                 `pos1`, `pos2`, `pos3`, `rot`, `status`)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(c.uid)
            .bind(&c.name)
            .bind(&c.race)
            .bind(&c.gender)
            .bind(&c.player_class)
            .bind(&c.area)
            .bind(c.position.x)
            .bind(c.position.y)
            .bind(c.position.z)
            .bind(c.rot)
            .bind(STATUS_ACTIVE)
            .execute(&mut *tx)
            .await?;
            let cid = res.last_insert_id();

            let s = &c.stats;
            sqlx::query(
                "INSERT INTO `player_stats` (`cid`, `health`, `magic`, `stamina`, `gold`, `level`,
                 `ab_con`, `ab_str`, `ab_dex`, `ab_int`, `ab_wis`, `ab_cha`)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(cid)
            .bind(s.health)
            .bind(s.magic)
            .bind(s.stamina)
            .bind(s.gold)
            .bind(s.level)
            .bind(s.ab_con)
            .bind(s.ab_str)
            .bind(s.ab_dex)
            .bind(s.ab_int)
            .bind(s.ab_wis)
            .bind(s.ab_cha)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(cid)
        }
        .boxed()
    }

    fn delete_character<'a>(&'a self, uid: u64, name: &'a str) -> BoxFuture<'a, StoreResult<bool>> {
        async move {
            let res = sqlx::query(
                "UPDATE `usr_chars` SET `status` = ? WHERE `uid` = ? AND `charname` = ? AND `status` = ?",
            )
            .bind(STATUS_DELETED)
            .bind(uid)
            .bind(name)
            .bind(STATUS_ACTIVE)
            .execute(&self.pool)
            .await?;
            Ok(res.rows_affected() > 0)
        }
        .boxed()
    }

    fn load_character<'a>(
        &'a self,
        uid: u64,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<CharacterRecord>>> {
        async move {
            let row = sqlx::query(
                "SELECT c.`cid`, c.`uid`, c.`charname`, c.`race`, c.`gender`, c.`class`, c.`area`,
                        c.`pos1`, c.`pos2`, c.`pos3`, c.`rot`, a.`roles`,
                        s.`health`, s.`magic`, s.`stamina`, s.`gold`, s.`level`,
                        s.`ab_con`, s.`ab_str`, s.`ab_dex`, s.`ab_int`, s.`ab_wis`, s.`ab_cha`
                 FROM `usr_chars` c
                 JOIN `usr_accts` a ON a.`uid` = c.`uid`
                 JOIN `player_stats` s ON s.`cid` = c.`cid`
                 WHERE c.`uid` = ? AND c.`charname` = ? AND c.`status` = ?",
            )
            .bind(uid)
            .bind(name)
            .bind(STATUS_ACTIVE)
            .fetch_optional(&self.pool)
            .await?;
            match row {
                Some(row) => Ok(Some(character_record(&row)?)),
                None => Ok(None),
            }
        }
        .boxed()
    }

    fn touch_character_login(&self, cid: u64) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            sqlx::query(
                "UPDATE `usr_chars` SET `last_login` = NOW(), `number_logins` = `number_logins` + 1
                 WHERE `cid` = ?",
            )
            .bind(cid)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
        .boxed()
    }

    fn save_character<'a>(&'a self, save: &'a CharacterSave) -> BoxFuture<'a, StoreResult<()>> {
        async move {
            let mut tx = self.pool.begin().await?;
            sqlx::query(
                "UPDATE `usr_chars` SET `area` = ?, `pos1` = ?, `pos2` = ?, `pos3` = ?, `rot` = ?,
                 `time_playing` = `time_playing` + ? WHERE `cid` = ?",
            )
            .bind(&save.area)
            .bind(save.position.x)
            .bind(save.position.y)
            .bind(save.position.z)
            .bind(save.rot)
            .bind(save.played_secs)
            .bind(save.cid)
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "UPDATE `player_stats` SET `health` = ?, `magic` = ?, `stamina` = ?, `gold` = ?
                 WHERE `cid` = ?",
            )
            .bind(save.health)
            .bind(save.magic)
            .bind(save.stamina)
            .bind(save.gold)
            .bind(save.cid)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(())
        }
        .boxed()
    }

    fn find_character<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<CharacterBrief>>> {
        async move {
            let row: Option<(u64, String, Option<String>)> = sqlx::query_as(
                "SELECT `cid`, `charname`, CAST(`last_login` AS CHAR) FROM `usr_chars`
                 WHERE `charname` = ? AND `status` = ?",
            )
            .bind(name)
            .bind(STATUS_ACTIVE)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.map(|(cid, name, last_login)| CharacterBrief {
                cid,
                name,
                last_login: last_login.unwrap_or_default(),
            }))
        }
        .boxed()
    }

    fn has_contact<'a>(
        &'a self,
        owner: u64,
        contact_name: &'a str,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        async move {
            let (n,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM `contact_list` l JOIN `usr_chars` c ON c.`cid` = l.`contact_cid` \
                 WHERE l.`cid` = ? AND c.`charname` = ?",
            )
            .bind(owner)
            .bind(contact_name)
            .fetch_one(&self.pool)
            .await?;
            Ok(n > 0)
        }
        .boxed()
    }

    fn add_contact<'a>(
        &'a self,
        owner: u64,
        contact: u64,
        contact_type: u8,
        comment: &'a str,
    ) -> BoxFuture<'a, StoreResult<()>> {
        async move {
            sqlx::query(
                "INSERT INTO `contact_list` (`cid`, `contact_cid`, `type`, `comment`) VALUES (?, ?, ?, ?)",
            )
            .bind(owner)
            .bind(contact)
            .bind((contact_type as char).to_string())
            .bind(comment)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
        .boxed()
    }

    fn remove_contact(&self, owner: u64, contact: u64) -> BoxFuture<'_, StoreResult<bool>> {
        async move {
            let res = sqlx::query("DELETE FROM `contact_list` WHERE `cid` = ? AND `contact_cid` = ?")
                .bind(owner)
                .bind(contact)
                .execute(&self.pool)
                .await?;
            Ok(res.rows_affected() > 0)
        }
        .boxed()
    }

    fn contacts_of(&self, owner: u64) -> BoxFuture<'_, StoreResult<Vec<ContactLink>>> {
        async move {
            let sql = format!("{} WHERE l.`cid` = ? ORDER BY c.`charname`", CONTACT_SELECT);
            let rows: Vec<ContactRow> = sqlx::query_as(&sql).bind(owner).fetch_all(&self.pool).await?;
            Ok(rows.into_iter().map(contact_link).collect())
        }
        .boxed()
    }

    fn watchers_of(&self, contact: u64) -> BoxFuture<'_, StoreResult<Vec<ContactLink>>> {
        async move {
            let sql = format!("{} WHERE l.`contact_cid` = ?", CONTACT_SELECT);
            let rows: Vec<ContactRow> =
                sqlx::query_as(&sql).bind(contact).fetch_all(&self.pool).await?;
            Ok(rows.into_iter().map(contact_link).collect())
        }
        .boxed()
    }

    fn load_game_time(&self) -> BoxFuture<'_, StoreResult<Option<u32>>> {
        async move {
            let row: Option<(u32,)> = sqlx::query_as("SELECT `gametime` FROM `world` WHERE `id` = ?")
                .bind(WORLD_ID)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(|(t,)| t))
        }
        .boxed()
    }

    fn save_game_time(&self, minutes: u32) -> BoxFuture<'_, StoreResult<()>> {
        async move {
            sqlx::query(
                "INSERT INTO `world` (`id`, `gametime`) VALUES (?, ?)
                 ON DUPLICATE KEY UPDATE `gametime` = VALUES(`gametime`)",
            )
            .bind(WORLD_ID)
            .bind(minutes)
            .execute(&self.pool)
            .await?;
            Ok(())
        }
        .boxed()
    }
}
