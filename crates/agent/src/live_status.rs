//! Catalog of the services and components mapped to this host's cluster.

use serde::Serialize;

use crate::protocol::ComponentsResponse;

/// Category the server uses for client-only components.
pub const CLIENT_CATEGORY: &str = "CLIENT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceComponent {
    pub service_name: String,
    pub component_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentCatalog {
    services: Vec<String>,
    client_components: Vec<ServiceComponent>,
    components: Vec<ServiceComponent>,
}

impl ComponentCatalog {
    pub fn from_response(response: &ComponentsResponse) -> Self {
        let mut catalog = Self::default();
        // BTreeMap keeps services sorted
        for (service, components) in &response.components {
            catalog.services.push(service.clone());
            for (component, category) in components {
                let entry = ServiceComponent {
                    service_name: service.clone(),
                    component_name: component.clone(),
                };
                if category == CLIENT_CATEGORY {
                    catalog.client_components.push(entry);
                } else {
                    catalog.components.push(entry);
                }
            }
        }
        catalog
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn client_components(&self) -> &[ServiceComponent] {
        &self.client_components
    }

    pub fn components(&self) -> &[ServiceComponent] {
        &self.components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_response() {
        let response: ComponentsResponse = serde_json::from_value(json!({
            "components": {
                "YARN": {"NODEMANAGER": "SLAVE", "YARN_CLIENT": "CLIENT"},
                "HDFS": {"DATANODE": "SLAVE", "NAMENODE": "MASTER"}
            }
        }))
        .unwrap();

        let catalog = ComponentCatalog::from_response(&response);
        assert_eq!(catalog.services(), ["HDFS", "YARN"]);
        assert_eq!(catalog.client_components().len(), 1);
        assert_eq!(catalog.client_components()[0].component_name, "YARN_CLIENT");
        assert_eq!(catalog.components().len(), 3);

        let mut catalog = catalog;
        catalog.clear();
        assert!(catalog.is_empty());
    }
}
