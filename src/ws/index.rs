//! WebSocket relay with Redis event subscription.
//!
//! The socket is receive-only for battle traffic: every mutation goes
//! through the HTTP action surface, and this endpoint forwards the
//! notices those actions publish. On connect it subscribes the caller's
//! personal channel plus the event channel of each live battle they
//! participate in.

use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_ws::{handle, Message};
use futures::StreamExt;
use redis::{AsyncCommands, Client as RedisClient};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::settings;
use crate::protocol::{battle_channel, user_channel};

pub async fn ws_index(
    req: HttpRequest,
    body: web::Payload,
    db_pool: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, Error> {
    // 1 · user_id query param
    let uid_str = req
        .query_string()
        .split('&')
        .find_map(|kv| kv.strip_prefix("user_id="))
        .ok_or_else(|| actix_web::error::ErrorBadRequest("user_id missing"))?;
    let user_id =
        Uuid::parse_str(uid_str).map_err(|_| actix_web::error::ErrorBadRequest("bad UUID"))?;

    // 2 · handshake
    let (response, mut session, mut ws_stream) = handle(&req, body)?;

    // 3 · presence key
    {
        let mut conn = redis
            .get_multiplexed_async_connection()
            .await
            .map_err(|_| actix_web::error::ErrorInternalServerError("redis"))?;
        let key = format!("session:{user_id}");
        let _: () = conn
            .set_ex(&key, "1", settings().presence_ttl)
            .await
            .unwrap_or(());
    }

    // 4 · battles this user is still in (terminal ones stopped emitting)
    let battle_ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT b.id
           FROM battles b
           JOIN battle_participants p ON p.battle_id = b.id
          WHERE p.user_id = $1
            AND b.status NOT IN ('ended', 'canceled')",
    )
    .bind(user_id)
    .fetch_all(db_pool.get_ref())
    .await
    .unwrap_or_default();

    // 5 · Redis subscribe
    let mut pubsub = redis
        .get_async_pubsub()
        .await
        .map_err(|_| actix_web::error::ErrorInternalServerError("redis subscribe"))?;
    pubsub
        .subscribe(user_channel(user_id))
        .await
        .map_err(|_| actix_web::error::ErrorInternalServerError("redis subscribe"))?;
    for bid in &battle_ids {
        pubsub
            .subscribe(battle_channel(*bid))
            .await
            .map_err(|_| actix_web::error::ErrorInternalServerError("redis subscribe"))?;
    }

    let redis_client = redis.get_ref().clone();

    actix::spawn(async move {
        let mut redis_stream = pubsub.on_message();

        loop {
            tokio::select! {
                // client → server: only pings and close matter here
                Some(frame) = ws_stream.next() => {
                    match frame {
                        Ok(Message::Ping(bytes)) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Ok(Message::Close(_)) | Err(_) => break,
                        _ => {}
                    }
                }
                // redis → client
                Some(msg) = redis_stream.next() => {
                    if let Ok(json) = msg.get_payload::<String>() {
                        if let Err(e) = session.text(json).await {
                            log::warn!("WS send failed for {user_id}: {e:?}");
                            break;
                        }
                    }
                }
                else => break,
            }
        }

        if let Ok(mut conn) = redis_client.get_multiplexed_async_connection().await {
            let _: () = conn.del(format!("session:{user_id}")).await.unwrap_or(());
        }
        log::info!("WS closed for user {user_id}");
    });

    Ok(response)
}
