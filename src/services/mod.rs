//! Catalog services: the blob store adapter, the image asset coordinator,
//! the movie query builder and repository, and the service tying them
//! together.

pub mod blob_store;
pub mod catalog_service;
pub mod image_service;
pub mod movie_query;
pub mod movie_repository;

#[cfg(test)]
pub mod test_support;
