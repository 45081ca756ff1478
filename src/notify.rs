//! Post-commit fan-out of battle notices over Redis pub/sub. Delivery
//! is best effort: the transaction already committed, so a publish
//! failure is logged and dropped rather than surfaced to the caller.

use redis::{AsyncCommands, Client as RedisClient};

use crate::protocol::{battle_channel, user_channel, Outbound};

pub async fn publish_all(redis: &RedisClient, outbound: Vec<Outbound>) {
    if outbound.is_empty() {
        return;
    }
    let mut conn = match redis.get_multiplexed_async_connection().await {
        Ok(c) => c,
        Err(e) => {
            log::warn!("redis unavailable, dropping {} notices: {e}", outbound.len());
            return;
        }
    };

    for notice in outbound {
        let (channel, msg) = match notice {
            Outbound::Battle(battle_id, msg) => (battle_channel(battle_id), msg),
            Outbound::User(user_id, msg) => (user_channel(user_id), msg),
        };
        match serde_json::to_string(&msg) {
            Ok(body) => {
                let _: () = conn.publish(&channel, body).await.unwrap_or(());
            }
            Err(e) => log::warn!("failed to encode notice for {channel}: {e}"),
        }
    }
}
