//! Route registry and request resolution.
//!
//! Templates are kept in a priority-ordered list (see
//! [`RouteTemplate::precedence`]): static templates first, then parameterized
//! ones, then catch-alls, with ties going to the template registered first.
//! Resolution walks that list and stops at the first template that both
//! accepts the path and has a route for the request method, so the outcome
//! never depends on hash-map iteration order.
use std::collections::HashMap;

use http::Method;

use crate::{
    core::{
        params::PathParams,
        template::{RouteError, RouteTemplate},
    },
    ports::handler::SharedHandler,
};

/// A registered (method, template) pair.
#[derive(Clone)]
pub struct Route {
    method: Method,
    handler: SharedHandler,
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn handler(&self) -> &SharedHandler {
        &self.handler
    }
}

struct TemplateEntry {
    template: RouteTemplate,
    seq: usize,
    routes: HashMap<Method, Route>,
}

/// Outcome of a successful lookup.
pub struct Resolved<'a> {
    pub template: &'a RouteTemplate,
    pub handler: SharedHandler,
    pub params: PathParams,
}

/// Mapping from template to per-method routes.
#[derive(Default)]
pub struct RouteRegistry {
    entries: Vec<TemplateEntry>,
    index: HashMap<String, usize>,
    next_seq: usize,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `template` and store `handler` under `(method, template)`.
    pub fn register(
        &mut self,
        method: Method,
        template: &str,
        handler: SharedHandler,
    ) -> Result<(), RouteError> {
        let compiled = match self.index.get(template) {
            Some(&position) => self.entries[position].template.clone(),
            None => RouteTemplate::parse(template)?,
        };
        self.insert(method, compiled, handler);
        Ok(())
    }

    /// Store `handler` under an already compiled template. Cannot fail, so a
    /// batch of templates can be compiled up front and inserted all at once.
    pub fn insert(&mut self, method: Method, template: RouteTemplate, handler: SharedHandler) {
        let existing = self.index.get(template.as_str()).copied();
        let position = match existing {
            Some(position) => position,
            None => self.push_template(template),
        };

        let entry = &mut self.entries[position];
        let route = Route {
            method: method.clone(),
            handler,
        };
        if entry.routes.insert(method.clone(), route).is_some() {
            tracing::warn!(
                method = %method,
                template = %entry.template.as_str(),
                "Route registered twice; the later handler replaces the earlier one"
            );
        } else {
            tracing::debug!(
                method = %method,
                template = %entry.template.as_str(),
                params = ?entry.template.param_names(),
                "Route registered"
            );
        }
    }

    fn push_template(&mut self, template: RouteTemplate) -> usize {
        let raw = template.as_str().to_string();
        self.entries.push(TemplateEntry {
            template,
            seq: self.next_seq,
            routes: HashMap::new(),
        });
        self.next_seq += 1;

        self.entries.sort_by(|a, b| {
            a.template
                .precedence(&b.template)
                .then_with(|| a.seq.cmp(&b.seq))
        });
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.template.as_str().to_string(), position))
            .collect();

        self.index.get(&raw).copied().unwrap_or(self.entries.len() - 1)
    }

    /// Find the route serving `method` + `path`, binding its parameters.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<Resolved<'_>> {
        self.entries.iter().find_map(|entry| {
            let route = entry.routes.get(method)?;
            let params = entry.template.captures(path)?;
            Some(Resolved {
                template: &entry.template,
                handler: route.handler.clone(),
                params,
            })
        })
    }

    /// Number of (method, template) routes.
    pub fn len(&self) -> usize {
        self.entries.iter().map(|entry| entry.routes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Templates in resolution order.
    pub fn templates(&self) -> impl Iterator<Item = &RouteTemplate> {
        self.entries.iter().map(|entry| &entry.template)
    }

    /// Consume the registry, yielding routes in registration order of their
    /// templates.
    pub fn into_routes(mut self) -> impl Iterator<Item = (String, Route)> {
        self.entries.sort_by_key(|entry| entry.seq);
        self.entries.into_iter().flat_map(|entry| {
            let template = entry.template.as_str().to_string();
            entry
                .routes
                .into_values()
                .map(move |route| (template.clone(), route))
        })
    }
}

impl std::fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| {
                let mut methods: Vec<_> = entry.routes.keys().map(Method::as_str).collect();
                methods.sort_unstable();
                (entry.template.as_str(), methods)
            }))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http::{Request, StatusCode};

    use super::*;
    use crate::ports::handler::handler_fn;

    fn tagged(tag: &'static str) -> SharedHandler {
        handler_fn(move |_req| async move { tag })
    }

    async fn body_of(handler: &SharedHandler) -> String {
        let response = handler
            .call(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_resolve_binds_params() {
        let mut registry = RouteRegistry::new();
        registry
            .register(Method::GET, "/users/{id}", tagged("user"))
            .unwrap();

        let resolved = registry.resolve(&Method::GET, "/users/42").unwrap();
        assert_eq!(resolved.template.as_str(), "/users/{id}");
        assert_eq!(resolved.params.get("id"), Some("42"));
        assert_eq!(body_of(&resolved.handler).await, "user");
    }

    #[test]
    fn test_method_is_part_of_the_key() {
        let mut registry = RouteRegistry::new();
        registry
            .register(Method::GET, "/users/{id}", tagged("user"))
            .unwrap();

        assert!(registry.resolve(&Method::POST, "/users/42").is_none());
        assert!(registry.resolve(&Method::GET, "/accounts/42").is_none());
    }

    #[tokio::test]
    async fn test_static_beats_param_beats_catch_all() {
        let mut registry = RouteRegistry::new();
        registry
            .register(Method::GET, "/files/*", tagged("catch-all"))
            .unwrap();
        registry
            .register(Method::GET, "/files/{name}", tagged("param"))
            .unwrap();
        registry
            .register(Method::GET, "/files/readme", tagged("static"))
            .unwrap();

        let resolve = |path: &str| registry.resolve(&Method::GET, path).unwrap().handler;
        assert_eq!(body_of(&resolve("/files/readme")).await, "static");
        assert_eq!(body_of(&resolve("/files/notes")).await, "param");
        assert_eq!(body_of(&resolve("/files/a/b/c")).await, "catch-all");
    }

    #[tokio::test]
    async fn test_lower_priority_template_serves_other_methods() {
        let mut registry = RouteRegistry::new();
        registry
            .register(Method::GET, "/items/new", tagged("form"))
            .unwrap();
        registry
            .register(Method::POST, "/items/{id}", tagged("update"))
            .unwrap();

        let resolved = registry.resolve(&Method::POST, "/items/new").unwrap();
        assert_eq!(resolved.params.get("id"), Some("new"));
        assert_eq!(body_of(&resolved.handler).await, "update");
    }

    #[tokio::test]
    async fn test_equal_precedence_falls_back_to_registration_order() {
        let mut registry = RouteRegistry::new();
        registry
            .register(Method::GET, "/{a}/b", tagged("first"))
            .unwrap();
        registry
            .register(Method::GET, "/a/{b}", tagged("second"))
            .unwrap();

        let resolved = registry.resolve(&Method::GET, "/a/b").unwrap();
        assert_eq!(body_of(&resolved.handler).await, "first");
    }

    #[tokio::test]
    async fn test_reregistration_replaces_handler() {
        let mut registry = RouteRegistry::new();
        registry
            .register(Method::GET, "/ping", tagged("old"))
            .unwrap();
        registry
            .register(Method::GET, "/ping", tagged("new"))
            .unwrap();
        registry
            .register(Method::HEAD, "/ping", tagged("head"))
            .unwrap();

        assert_eq!(registry.len(), 2);
        let resolved = registry.resolve(&Method::GET, "/ping").unwrap();
        assert_eq!(body_of(&resolved.handler).await, "new");
    }

    #[test]
    fn test_invalid_template_is_not_stored() {
        let mut registry = RouteRegistry::new();
        let result = registry.register(Method::GET, "/users/{id", tagged("x"));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_into_routes_keeps_registration_order() {
        let mut registry = RouteRegistry::new();
        registry.register(Method::GET, "/z/*", tagged("z")).unwrap();
        registry.register(Method::GET, "/a", tagged("a")).unwrap();

        let templates: Vec<_> = registry
            .into_routes()
            .map(|(template, _)| template)
            .collect();
        assert_eq!(templates, vec!["/z/*", "/a"]);
    }
}
