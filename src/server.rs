//! Local HTTP surface: read the store's slices and drive the dashboard's controls.

use actix_web::{web, HttpResponse, Responder};
use log::info;
use serde::Deserialize;
use serde_json::json;

use crate::appstate::Store;
use crate::swarm::SwarmSnapshotUpdate;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub user_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SelectTestrunRequest {
    /// Display string as listed in `testrunsForDisplay`.
    pub testrun: String,
}

/// Absent fields are left alone; an empty `profile` clears the filter.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolbarRequest {
    pub resolution: Option<u32>,
    pub profile: Option<String>,
    pub should_show_advanced: Option<bool>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/state", web::get().to(get_state))
        .route("/toolbar", web::get().to(get_toolbar))
        .route("/toolbar", web::post().to(update_toolbar))
        .route("/toolbar/testrun", web::post().to(select_testrun))
        .route("/charts", web::get().to(get_charts))
        .route("/stats", web::get().to(get_stats))
        .route("/scatterplot", web::get().to(get_scatterplot))
        .route("/testruns", web::get().to(get_testruns))
        .route("/customer", web::get().to(get_customer))
        .route("/snackbar", web::get().to(get_snackbar))
        .route("/snackbar/close", web::post().to(close_snackbar))
        .route("/swarm", web::post().to(update_swarm))
        .route("/swarm-form", web::get().to(get_swarm_form))
        .route("/swarm-form/validate", web::post().to(validate_swarm_form))
        .route("/swarm-form/dismiss", web::post().to(dismiss_swarm_form))
        .route("/ui/view-type", web::post().to(toggle_view_type));
}

async fn get_state(store: web::Data<Store>) -> impl Responder {
    HttpResponse::Ok().json(store.snapshot().await)
}

async fn get_toolbar(store: web::Data<Store>) -> impl Responder {
    HttpResponse::Ok().json(store.read(|state| state.toolbar.clone()).await)
}

async fn get_charts(store: web::Data<Store>) -> impl Responder {
    HttpResponse::Ok().json(store.read(|state| state.charts.clone()).await)
}

async fn get_stats(store: web::Data<Store>) -> impl Responder {
    HttpResponse::Ok().json(store.read(|state| state.stats.clone()).await)
}

async fn get_scatterplot(store: web::Data<Store>) -> impl Responder {
    HttpResponse::Ok().json(store.read(|state| state.scatterplot.clone()).await)
}

async fn get_testruns(store: web::Data<Store>) -> impl Responder {
    HttpResponse::Ok().json(store.read(|state| state.testruns.clone()).await)
}

async fn get_customer(store: web::Data<Store>) -> impl Responder {
    HttpResponse::Ok().json(store.read(|state| state.customer.clone()).await)
}

async fn get_snackbar(store: web::Data<Store>) -> impl Responder {
    HttpResponse::Ok().json(store.read(|state| state.snackbar.clone()).await)
}

async fn close_snackbar(store: web::Data<Store>) -> impl Responder {
    let snackbar = store
        .update(|state| {
            state.close_snackbar();
            state.snackbar.clone()
        })
        .await;
    HttpResponse::Ok().json(snackbar)
}

async fn get_swarm_form(store: web::Data<Store>) -> impl Responder {
    HttpResponse::Ok().json(store.read(|state| state.swarm_form_status()).await)
}

async fn validate_swarm_form(store: web::Data<Store>, body: web::Json<ValidateRequest>) -> impl Responder {
    let status = store
        .update(|state| {
            state.swarm_form_user_count = body.user_count;
            state.swarm_form_status()
        })
        .await;
    HttpResponse::Ok().json(status)
}

async fn dismiss_swarm_form(store: web::Data<Store>) -> impl Responder {
    let status = store
        .update(|state| {
            state.dismiss_swarm_form();
            state.swarm_form_status()
        })
        .await;
    info!("Swarm form dismissed");
    HttpResponse::Ok().json(status)
}

async fn update_swarm(store: web::Data<Store>, body: web::Json<SwarmSnapshotUpdate>) -> impl Responder {
    let update = body.into_inner();
    let state = update.state;
    let (previous, swarm) = store
        .update(|app| (app.swarm.apply(update), app.swarm.clone()))
        .await;
    if let Some(previous) = previous {
        info!("Swarm state changed from '{}' to '{}'", previous, state);
    }
    HttpResponse::Ok().json(swarm)
}

async fn select_testrun(store: web::Data<Store>, body: web::Json<SelectTestrunRequest>) -> impl Responder {
    let selected = store
        .update(|state| state.select_testrun(&body.testrun).then(|| state.toolbar.clone()))
        .await;

    match selected {
        Some(toolbar) => HttpResponse::Ok().json(toolbar),
        None => HttpResponse::NotFound().json(json!({ "error": format!("Unknown test run '{}'", body.testrun) })),
    }
}

async fn update_toolbar(store: web::Data<Store>, body: web::Json<ToolbarRequest>) -> impl Responder {
    let request = body.into_inner();
    let toolbar = store
        .update(|state| {
            if let Some(resolution) = request.resolution {
                state.set_resolution(resolution);
            }
            if let Some(profile) = request.profile {
                state.set_profile(Some(profile));
            }
            if let Some(show) = request.should_show_advanced {
                state.set_show_advanced(show);
            }
            state.toolbar.clone()
        })
        .await;
    HttpResponse::Ok().json(toolbar)
}

async fn toggle_view_type(store: web::Data<Store>) -> impl Responder {
    let ui = store
        .update(|state| {
            state.toggle_view_type();
            state.ui.clone()
        })
        .await;
    HttpResponse::Ok().json(ui)
}
