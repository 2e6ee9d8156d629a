//! Typed CRUD access to the backoffice resource collections.

use std::fmt::Display;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::client::{ApiClient, RequestOptions};
use crate::error::{ErrorKind, NormalizedError};

/// The REST collections exposed by the backoffice API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Products,
    Vehicles,
    Sales,
    Inventory,
    Categories,
    Brands,
    Sites,
    Roles,
    Menus,
}

impl Resource {
    pub const ALL: [Resource; 10] = [
        Resource::Users,
        Resource::Products,
        Resource::Vehicles,
        Resource::Sales,
        Resource::Inventory,
        Resource::Categories,
        Resource::Brands,
        Resource::Sites,
        Resource::Roles,
        Resource::Menus,
    ];

    /// Collection path segment on the server.
    pub fn segment(self) -> &'static str {
        match self {
            Resource::Users => "usuarios",
            Resource::Products => "productos",
            Resource::Vehicles => "vehiculos",
            Resource::Sales => "ventas",
            Resource::Inventory => "inventario",
            Resource::Categories => "categorias",
            Resource::Brands => "marcas",
            Resource::Sites => "sitios",
            Resource::Roles => "roles",
            Resource::Menus => "menus",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.segment() == segment)
    }

    pub fn collection_path(self) -> String {
        format!("/{}", self.segment())
    }

    pub fn item_path(self, id: impl Display) -> String {
        format!("/{}/{id}", self.segment())
    }
}

/// CRUD calls for one collection, decoding items as `T`.
pub struct ResourceClient<'a, T> {
    client: &'a ApiClient,
    resource: Resource,
    _item: PhantomData<fn() -> T>,
}

impl ApiClient {
    pub fn resource<T>(&self, resource: Resource) -> ResourceClient<'_, T> {
        ResourceClient {
            client: self,
            resource,
            _item: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> ResourceClient<'_, T> {
    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// Fetch the collection. Accepts either a bare array or an object
    /// wrapping it under `data`.
    pub fn list(&self, options: &RequestOptions) -> Result<Vec<T>, NormalizedError> {
        let payload = self.client.get(&self.resource.collection_path(), options)?;
        let items = match payload {
            Value::Object(mut body) if body.get("data").is_some_and(Value::is_array) => {
                body.remove("data").unwrap_or_default()
            }
            other => other,
        };
        serde_json::from_value(items).map_err(|e| {
            NormalizedError::new(
                ErrorKind::UnknownError,
                format!("unexpected {} listing: {e}", self.resource.segment()),
            )
        })
    }

    /// Like `list`, but a failure yields an empty list after logging it.
    pub fn list_or_empty(&self, options: &RequestOptions) -> Vec<T> {
        self.list(options).unwrap_or_else(|error| {
            tracing::warn!(
                resource = self.resource.segment(),
                kind = %error.kind,
                message = %error.message,
                "listing failed; showing an empty list"
            );
            Vec::new()
        })
    }

    pub fn get(&self, id: impl Display) -> Result<T, NormalizedError> {
        self.client.get_as(&self.resource.item_path(id), &RequestOptions::default())
    }

    pub fn create<B: Serialize + ?Sized>(&self, body: &B) -> Result<T, NormalizedError> {
        self.client
            .post_as(&self.resource.collection_path(), body, &RequestOptions::default())
    }

    pub fn update<B: Serialize + ?Sized>(&self, id: impl Display, body: &B) -> Result<T, NormalizedError> {
        self.client
            .put_as(&self.resource.item_path(id), body, &RequestOptions::default())
    }

    pub fn remove(&self, id: impl Display) -> Result<(), NormalizedError> {
        self.client
            .delete(&self.resource.item_path(id), &RequestOptions::default())
            .map(|_| ())
    }
}
