//! HTTP surface of the reading service.
//!
//! # Endpoints
//!
//! - `GET  /health`                    : Liveness probe
//! - `POST /tarot/readings`            : Phase 1: validate a question, create a reading
//! - `GET  /tarot/readings/my`         : Caller's readings (`?question=&date=`)
//! - `GET  /tarot/readings/:id`        : Reading with its cards
//! - `GET  /tarot/readings/:id/cards`  : Cards of a reading
//! - `POST /tarot/readings/:id/insight`: Phase 2: generate the celestial insight
//! - `POST /tarot/celestial`           : Free-form guidance for a question
//! - `GET  /tarot/suits`               : Suits
//! - `GET  /tarot/cards`               : Catalog (`?suit=&name=&keywords=&limit=&offset=`)
//! - `GET  /tarot/cards/:key`          : Card by id or slug
//! - `GET  /mentors`                   : Mentors (`?is_active=`)
//! - `GET  /mentors/:id`               : Mentor detail
//! - `POST /mentors/:id`               : Pick preferred mentor
//! - `GET  /users/me`                  : Caller's profile and token balance
//!
//! The caller is identified by the `X-User-Id` header.

mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{app_router, AppState, USER_HEADER};
