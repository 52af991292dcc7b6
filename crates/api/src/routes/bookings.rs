use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{middleware, Json, Router};
use serde::Deserialize;
use serde_json::json;
use sqlx::types::Uuid;

use taskbay_common::ModuleClient;
use taskbay_core::booking::{self, CreateBooking};
use taskbay_core::policy::{self, Action, Resource};
use taskbay_core::BookingStatus;

use crate::middleware::{authenticate, ensure_account};
use crate::response::{AppError, AppSuccess};
use crate::GlobalState;

pub fn booking_routes() -> Router<GlobalState> {
    Router::new()
        .route("/bookings",
            post(create_booking)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/bookings",
            get(list_bookings)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/bookings/{booking_id}",
            get(get_booking)
                .route_layer(middleware::from_fn(authenticate))
        )
        .route("/bookings/{booking_id}/status",
            put(update_booking_status)
                .route_layer(middleware::from_fn(authenticate))
        )
}

async fn create_booking(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Json(payload): Json<CreateBooking>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Booking, Action::Create)?;

    let (booking, user) = booking::create_booking(state.db.get_client(), &user, payload).await?;
    Ok(AppSuccess::new(
        StatusCode::CREATED,
        "Booking created",
        json!({ "booking": booking.into_view(), "creditsRemaining": user.credits }),
    ))
}

#[derive(Debug, Deserialize)]
struct ListBookingsQuery {
    status: Option<BookingStatus>,
}

async fn list_bookings(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Query(query): Query<ListBookingsQuery>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Booking, Action::Read)?;

    let bookings = booking::list_bookings(state.db.get_client(), &user, query.status).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Bookings fetched", json!(bookings)))
}

async fn get_booking(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Path(booking_id): Path<Uuid>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Booking, Action::Read)?;
    policy::ensure_owner(state.db.get_client(), &user, Resource::Booking, booking_id).await?;

    let booking = booking::get_booking(state.db.get_client(), &user, booking_id).await?;
    Ok(AppSuccess::new(StatusCode::OK, "Booking fetched", json!(booking)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingStatusRequest {
    pub status: BookingStatus,
}

async fn update_booking_status(
    State(state): State<GlobalState>,
    Extension(user_id): Extension<Uuid>,
    Path(booking_id): Path<Uuid>,
    Json(payload): Json<UpdateBookingStatusRequest>,
) -> Result<AppSuccess, AppError> {
    let user = ensure_account(&state, user_id).await?;
    policy::ensure_permitted(&user, Resource::Booking, Action::Update)?;

    let booking =
        booking::update_booking_status(state.db.get_client(), &user, booking_id, payload.status)
            .await?;
    Ok(AppSuccess::new(
        StatusCode::OK,
        "Booking status updated",
        json!(booking.into_view()),
    ))
}
