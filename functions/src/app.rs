//! The function app: every function the host serves, registered once at
//! startup and shared read-only with the HTTP service and the queue triggers.

use crate::errors::{FunctionError, Result};
use crate::handler::{HttpFunction, QueueFunction};
use crate::settings::QueueBinding;
use http::Method;
use indexmap::IndexMap;
use indexmap::map::Entry;
use routing::{Resolution, Route, RouteTable};
use std::sync::Arc;

/// Methods accepted by an HTTP function that does not restrict them.
pub const DEFAULT_METHODS: [Method; 2] = [Method::GET, Method::POST];

#[derive(Clone)]
pub struct QueueTriggerRegistration {
    pub function: Arc<dyn QueueFunction>,
    pub binding: QueueBinding,
}

enum Registration {
    Http {
        route: String,
        methods: Vec<Method>,
        function: Arc<dyn HttpFunction>,
    },
    QueueTrigger(QueueTriggerRegistration),
}

pub struct FunctionApp {
    route_prefix: String,
    routes: RouteTable<Arc<dyn HttpFunction>>,
    queue_triggers: Vec<QueueTriggerRegistration>,
}

impl FunctionApp {
    pub fn builder(route_prefix: &str) -> FunctionAppBuilder {
        FunctionAppBuilder {
            route_prefix: route_prefix.trim().trim_matches('/').to_string(),
            functions: IndexMap::new(),
            duplicate: None,
        }
    }

    pub fn route_prefix(&self) -> &str {
        &self.route_prefix
    }

    pub fn resolve<'a>(
        &'a self,
        method: &Method,
        path: &'a str,
    ) -> Resolution<'a, Arc<dyn HttpFunction>> {
        self.routes.resolve(method, path)
    }

    /// Route patterns in registration order.
    pub fn http_routes(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.routes
            .routes()
            .map(|route| (route.pattern(), route.action().name()))
    }

    pub fn queue_triggers(&self) -> &[QueueTriggerRegistration] {
        &self.queue_triggers
    }
}

pub struct FunctionAppBuilder {
    route_prefix: String,
    functions: IndexMap<&'static str, Registration>,
    duplicate: Option<&'static str>,
}

impl FunctionAppBuilder {
    /// Registers an HTTP function under `/{route_prefix}/{route}`.
    pub fn http_function(
        self,
        route: &str,
        methods: &[Method],
        function: Arc<dyn HttpFunction>,
    ) -> Self {
        let name = function.name();
        self.register(
            name,
            Registration::Http {
                route: route.trim().trim_matches('/').to_string(),
                methods: methods.to_vec(),
                function,
            },
        )
    }

    pub fn queue_trigger(self, binding: QueueBinding, function: Arc<dyn QueueFunction>) -> Self {
        let name = function.name();
        self.register(
            name,
            Registration::QueueTrigger(QueueTriggerRegistration { function, binding }),
        )
    }

    fn register(mut self, name: &'static str, registration: Registration) -> Self {
        match self.functions.entry(name) {
            Entry::Occupied(_) => {
                self.duplicate.get_or_insert(name);
            }
            Entry::Vacant(entry) => {
                entry.insert(registration);
            }
        }
        self
    }

    pub fn build(self) -> Result<FunctionApp> {
        if let Some(name) = self.duplicate {
            return Err(FunctionError::DuplicateFunction(name.to_string()));
        }

        let mut routes = RouteTable::default();
        let mut queue_triggers = Vec::new();

        for (name, registration) in self.functions {
            match registration {
                Registration::Http {
                    route,
                    methods,
                    function,
                } => {
                    let pattern = format!("/{}/{}", self.route_prefix, route);
                    tracing::debug!(function = name, route = %pattern, "registered http function");
                    routes.push(Route::new(pattern, Some(methods), function));
                }
                Registration::QueueTrigger(trigger) => {
                    tracing::debug!(
                        function = name,
                        queue = %trigger.binding.queue_name,
                        "registered queue trigger"
                    );
                    queue_triggers.push(trigger);
                }
            }
        }

        Ok(FunctionApp {
            route_prefix: self.route_prefix,
            routes,
            queue_triggers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HttpRequest;
    use async_trait::async_trait;
    use hyper::Response;
    use hyper::body::Bytes;
    use queue::QueueMessage;

    struct Named(&'static str);

    #[async_trait]
    impl HttpFunction for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn invoke(&self, _request: HttpRequest) -> Result<Response<Bytes>> {
            Ok(Response::new(Bytes::from(self.0)))
        }
    }

    #[async_trait]
    impl QueueFunction for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn invoke(&self, _message: &QueueMessage) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_routes_in_registration_order() {
        let app = FunctionApp::builder("/api/")
            .http_function("first", &DEFAULT_METHODS, Arc::new(Named("first")))
            .queue_trigger(QueueBinding::service_bus(), Arc::new(Named("consumer")))
            .http_function("second", &[Method::GET], Arc::new(Named("second")))
            .build()
            .unwrap();

        assert_eq!(app.route_prefix(), "api");
        let routes: Vec<_> = app.http_routes().collect();
        assert_eq!(routes, vec![("/api/first", "first"), ("/api/second", "second")]);
        assert_eq!(app.queue_triggers().len(), 1);
        assert_eq!(app.queue_triggers()[0].function.name(), "consumer");

        match app.resolve(&Method::POST, "/api/first") {
            Resolution::Matched(m) => assert_eq!(m.action.name(), "first"),
            _ => panic!("expected a match"),
        }
        assert!(matches!(
            app.resolve(&Method::POST, "/api/second"),
            Resolution::MethodNotAllowed
        ));
        assert!(matches!(
            app.resolve(&Method::GET, "/first"),
            Resolution::NotFound
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = FunctionApp::builder("api")
            .http_function("a", &DEFAULT_METHODS, Arc::new(Named("same")))
            .queue_trigger(QueueBinding::service_bus(), Arc::new(Named("same")))
            .build();

        assert!(matches!(
            result,
            Err(FunctionError::DuplicateFunction(name)) if name == "same"
        ));
    }
}
