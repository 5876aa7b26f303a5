//! Domain services: the upload pipeline and the collaborators it drives.

pub mod aspect;
pub mod keys;
pub mod local_object_store;
pub mod object_store;
pub mod remux;
pub mod staging;
pub mod subprocess;
pub mod thumbnail_service;
pub mod upload_pipeline;
pub mod video_store;
