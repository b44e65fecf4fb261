//! Atlas Intake API Library
//!
//! Backend for the construction-price-advocacy site: homeowner lead intake
//! with a welcome and follow-up email cadence, audit report generation and
//! public report reads, homeowner authorization notices, and contractor
//! partner onboarding through a tokenised agreement.
//!
//! # Modules
//!
//! - `analytics`: Best-effort analytics events.
//! - `audits`: Audit generation and report reads.
//! - `authorization`: Homeowner authorization notices.
//! - `circuit_breaker`: Circuit breaker for the email provider.
//! - `config`: Configuration management.
//! - `contractors`: Contractor onboarding state machine.
//! - `db`: Database connection and pool management.
//! - `emails`: Email templates.
//! - `errors`: Error handling types.
//! - `followups`: Follow-up cadence scheduler.
//! - `handlers`: HTTP request handlers.
//! - `leads`: Lead intake and the welcome email.
//! - `models`: Core data models.
//! - `notifier`: Email delivery (Resend, plus an in-memory recorder).
//! - `openapi`: OpenAPI document.
//! - `routes`: Router and middleware.
//! - `security`: Bearer checks and agreement tokens.
//! - `signal`: Pricing signal computation.
//! - `storage`: Contractor document storage.
//! - `store`: Relational store (Postgres, plus an in-memory implementation).

pub mod analytics;
pub mod audits;
pub mod authorization;
pub mod circuit_breaker;
pub mod config;
pub mod contractors;
pub mod db;
pub mod emails;
pub mod errors;
pub mod followups;
pub mod handlers;
pub mod leads;
pub mod models;
pub mod notifier;
pub mod openapi;
pub mod routes;
pub mod security;
pub mod signal;
pub mod storage;
pub mod store;
