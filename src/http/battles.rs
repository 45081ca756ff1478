//! The battle action surface: create, sync, configure, and every
//! lifecycle transition. Each mutating handler runs one engine action
//! inside a locked transaction (see `battle::service`) and publishes
//! its notices only after the commit.

use actix_web::{get, post, web, HttpResponse};
use redis::Client as RedisClient;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::battle::engine::ConfigUpdate;
use crate::battle::events::EventType;
use crate::battle::service;
use crate::battle::snapshot::Snapshot;
use crate::db::{battle_repo, campaign_repo};
use crate::error::BattleError;
use crate::http::auth::JwtAuth;
use crate::notify;

//////////////////////////////////////////////////
// Requests
//////////////////////////////////////////////////

#[derive(Deserialize)]
pub struct CreateReq {
    pub campaign_id: Uuid,
    pub title: Option<String>,
    pub scenario: Option<String>,
    pub settings: Option<Value>,
    #[serde(default)]
    pub participant_user_ids: Vec<Uuid>,
    #[serde(default)]
    pub participant_ratings: BTreeMap<Uuid, i64>,
}

#[derive(Deserialize)]
pub struct StateQuery {
    #[serde(rename = "sinceEventId")]
    pub since_event_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ConfigReq {
    pub selected_units: Option<Vec<String>>,
    pub stat_overrides: Option<Value>,
    pub custom_units: Option<Value>,
    pub rating: Option<i64>,
}

#[derive(Deserialize)]
pub struct ReadyReq {
    pub ready: Value,
}

#[derive(Deserialize)]
pub struct SubmitEventReq {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(alias = "payload_json")]
    pub payload: Value,
}

#[derive(Deserialize)]
pub struct WinnerReq {
    pub winner_warband_id: Uuid,
}

/// `{ready: ...}` takes a boolean or the usual stringly forms.
fn parse_ready_flag(v: &Value) -> Result<bool, BattleError> {
    match v {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(BattleError::validation(format!(
                "cannot read '{other}' as a ready flag"
            ))),
        },
        _ => Err(BattleError::validation("ready must be a boolean")),
    }
}

async fn respond(
    redis: &RedisClient,
    snapshot: Snapshot,
    outbound: Vec<crate::protocol::Outbound>,
    created: bool,
) -> HttpResponse {
    notify::publish_all(redis, outbound).await;
    if created {
        HttpResponse::Created().json(snapshot)
    } else {
        HttpResponse::Ok().json(snapshot)
    }
}

//////////////////////////////////////////////////
// Handlers
//////////////////////////////////////////////////

/// POST /api/battles
#[post("/battles")]
pub async fn create(
    auth: JwtAuth,
    info: web::Json<CreateReq>,
    db: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, BattleError> {
    let scenario = info
        .scenario
        .as_deref()
        .ok_or_else(|| BattleError::validation("scenario is required"))?;

    let (snapshot, outbound) = service::create_battle(
        db.get_ref(),
        info.campaign_id,
        auth.user_id,
        info.title.as_deref(),
        scenario,
        info.settings.as_ref(),
        &info.participant_user_ids,
        &info.participant_ratings,
    )
    .await?;
    Ok(respond(redis.get_ref(), snapshot, outbound, true).await)
}

/// GET /api/battles/{id}/state?sinceEventId=N
#[get("/battles/{id}/state")]
pub async fn state(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    query: web::Query<StateQuery>,
    db: web::Data<PgPool>,
) -> Result<HttpResponse, BattleError> {
    let since = match query.since_event_id.as_deref() {
        None | Some("") => 0,
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| BattleError::validation("sinceEventId must be an integer"))?,
    };
    let snapshot = service::fetch_state(db.get_ref(), path.into_inner(), auth.user_id, since).await?;
    Ok(HttpResponse::Ok().json(snapshot))
}

/// POST /api/battles/{id}/config
#[post("/battles/{id}/config")]
pub async fn config(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    info: web::Json<ConfigReq>,
    db: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, BattleError> {
    let update = ConfigUpdate {
        selected_units: info.selected_units.clone(),
        stat_overrides: info.stat_overrides.clone(),
        custom_units: info.custom_units.clone(),
        rating: info.rating,
    };
    let (snapshot, outbound) = service::run_action(db.get_ref(), path.into_inner(), |agg, now| {
        agg.update_config(auth.user_id, &update, now)
    })
    .await?;
    Ok(respond(redis.get_ref(), snapshot, outbound, false).await)
}

/// POST /api/battles/{id}/join
#[post("/battles/{id}/join")]
pub async fn join(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    db: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, BattleError> {
    let (snapshot, outbound) = service::run_action(db.get_ref(), path.into_inner(), |agg, now| {
        agg.join(auth.user_id, now)
    })
    .await?;
    Ok(respond(redis.get_ref(), snapshot, outbound, false).await)
}

/// POST /api/battles/{id}/ready
#[post("/battles/{id}/ready")]
pub async fn ready(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    info: web::Json<ReadyReq>,
    db: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, BattleError> {
    let flag = parse_ready_flag(&info.ready)?;
    let (snapshot, outbound) = service::run_action(db.get_ref(), path.into_inner(), |agg, now| {
        agg.set_ready(auth.user_id, flag, now)
    })
    .await?;
    Ok(respond(redis.get_ref(), snapshot, outbound, false).await)
}

/// POST /api/battles/{id}/start
#[post("/battles/{id}/start")]
pub async fn start(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    db: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, BattleError> {
    let (snapshot, outbound) = service::run_action(db.get_ref(), path.into_inner(), |agg, now| {
        agg.start(auth.user_id, now)
    })
    .await?;
    Ok(respond(redis.get_ref(), snapshot, outbound, false).await)
}

/// POST /api/battles/{id}/events
#[post("/battles/{id}/events")]
pub async fn submit_event(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    info: web::Json<SubmitEventReq>,
    db: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, BattleError> {
    let event_type: EventType = info
        .event_type
        .parse()
        .map_err(BattleError::Validation)?;
    let (snapshot, outbound) = service::run_action(db.get_ref(), path.into_inner(), |agg, now| {
        agg.submit_event(auth.user_id, event_type, &info.payload, now)
    })
    .await?;
    Ok(respond(redis.get_ref(), snapshot, outbound, false).await)
}

/// POST /api/battles/{id}/finish
#[post("/battles/{id}/finish")]
pub async fn finish(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    db: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, BattleError> {
    let (snapshot, outbound) = service::run_action(db.get_ref(), path.into_inner(), |agg, now| {
        agg.finish(auth.user_id, now)
    })
    .await?;
    Ok(respond(redis.get_ref(), snapshot, outbound, false).await)
}

/// POST /api/battles/{id}/winner
#[post("/battles/{id}/winner")]
pub async fn winner(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    info: web::Json<WinnerReq>,
    db: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, BattleError> {
    let (snapshot, outbound) = service::run_action(db.get_ref(), path.into_inner(), |agg, now| {
        agg.declare_winner(auth.user_id, info.winner_warband_id, now)
    })
    .await?;
    Ok(respond(redis.get_ref(), snapshot, outbound, false).await)
}

/// POST /api/battles/{id}/confirm
#[post("/battles/{id}/confirm")]
pub async fn confirm(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    db: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, BattleError> {
    let (snapshot, outbound) = service::run_action(db.get_ref(), path.into_inner(), |agg, now| {
        agg.confirm(auth.user_id, now)
    })
    .await?;
    Ok(respond(redis.get_ref(), snapshot, outbound, false).await)
}

/// POST /api/battles/{id}/cancel — withdraw own participation.
#[post("/battles/{id}/cancel")]
pub async fn cancel(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    db: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, BattleError> {
    let (snapshot, outbound) = service::run_action(db.get_ref(), path.into_inner(), |agg, now| {
        agg.cancel_self(auth.user_id, now)
    })
    .await?;
    Ok(respond(redis.get_ref(), snapshot, outbound, false).await)
}

/// POST /api/battles/{id}/cancel-battle — creator-only force cancel.
#[post("/battles/{id}/cancel-battle")]
pub async fn cancel_battle(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    db: web::Data<PgPool>,
    redis: web::Data<RedisClient>,
) -> Result<HttpResponse, BattleError> {
    let (snapshot, outbound) = service::run_action(db.get_ref(), path.into_inner(), |agg, now| {
        agg.cancel_battle(auth.user_id, now)
    })
    .await?;
    Ok(respond(redis.get_ref(), snapshot, outbound, false).await)
}

/// GET /api/battles/campaign/{campaign_id} — lobby listing.
#[get("/battles/campaign/{campaign_id}")]
pub async fn list_for_campaign(
    auth: JwtAuth,
    path: web::Path<Uuid>,
    db: web::Data<PgPool>,
) -> Result<HttpResponse, BattleError> {
    let campaign_id = path.into_inner();
    if !campaign_repo::is_member(db.get_ref(), campaign_id, auth.user_id).await? {
        return Err(BattleError::NotFound);
    }
    let rows = battle_repo::list_for_campaign(db.get_ref(), campaign_id).await?;
    Ok(HttpResponse::Ok().json(rows))
}

//////////////////////////////////////////////////
// Mount
//////////////////////////////////////////////////
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create)
        .service(state)
        .service(config)
        .service(join)
        .service(ready)
        .service(start)
        .service(submit_event)
        .service(finish)
        .service(winner)
        .service(confirm)
        .service(cancel)
        .service(cancel_battle)
        .service(list_for_campaign);
}

#[cfg(test)]
mod tests {
    use super::parse_ready_flag;
    use serde_json::json;

    #[test]
    fn ready_flag_accepts_booleans_and_stringly_forms() {
        assert!(parse_ready_flag(&json!(true)).unwrap());
        assert!(!parse_ready_flag(&json!(false)).unwrap());
        for s in ["true", "1", "yes", " YES ", "True"] {
            assert!(parse_ready_flag(&json!(s)).unwrap(), "{s}");
        }
        for s in ["false", "0", "no", " No ", "FALSE"] {
            assert!(!parse_ready_flag(&json!(s)).unwrap(), "{s}");
        }
    }

    #[test]
    fn ready_flag_rejects_everything_else() {
        for v in [
            json!(1),
            json!(0),
            json!(1.0),
            json!(null),
            json!("maybe"),
            json!(""),
            json!([true]),
            json!({}),
        ] {
            assert!(parse_ready_flag(&v).is_err(), "{v}");
        }
    }
}
