//! Request / response bodies documented in the OpenAPI spec.

pub mod chat;
