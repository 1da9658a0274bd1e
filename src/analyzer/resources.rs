use super::{ApiDescription, Dependency, DependencyType, Endpoint, NodeRef, Strength};
use crate::config::AnalyzerConfig;
use crate::model::HttpMethod;
use std::collections::BTreeMap;

/// Lifecycle order of the operations on one resource.
const LIFECYCLE: [HttpMethod; 4] = [
    HttpMethod::Post,
    HttpMethod::Put,
    HttpMethod::Get,
    HttpMethod::Delete,
];

/// Chain the lifecycle operations present on each resource.
pub(super) fn extract(api: &ApiDescription, config: &AnalyzerConfig) -> Vec<Dependency> {
    let mut groups: BTreeMap<&str, Vec<&Endpoint>> = BTreeMap::new();
    for endpoint in api.endpoints() {
        if let Some(resource) = resource_of(&endpoint.path) {
            groups.entry(resource).or_default().push(endpoint);
        }
    }

    let mut deps = Vec::new();
    for endpoints in groups.values() {
        let chain: Vec<&Endpoint> = LIFECYCLE
            .iter()
            .filter_map(|method| representative(endpoints, *method))
            .collect();

        for pair in chain.windows(2) {
            let (source, target) = (pair[0], pair[1]);
            let creates = source.method == HttpMethod::Post;
            deps.push(Dependency {
                dependency_type: DependencyType::ResourceOperation,
                source: NodeRef::operation(source),
                target: NodeRef::operation(target),
                field: None,
                strength: if creates {
                    Strength::Required
                } else {
                    Strength::Optional
                },
                confidence: if creates {
                    config.resource_from_create_confidence
                } else {
                    config.resource_other_confidence
                },
            });
        }
    }
    deps
}

/// First literal path segment: `/users/{id}/posts` → `users`.
pub(super) fn resource_of(path: &str) -> Option<&str> {
    path.split('/')
        .find(|segment| !segment.is_empty())
        .filter(|segment| !segment.starts_with('{'))
}

/// POST is represented by its collection path, the others by their
/// item path.
fn representative<'a>(endpoints: &[&'a Endpoint], method: HttpMethod) -> Option<&'a Endpoint> {
    endpoints
        .iter()
        .copied()
        .filter(|endpoint| endpoint.method == method)
        .min_by_key(|endpoint| {
            let params = endpoint.path_params().len();
            let rank = if method == HttpMethod::Post {
                params
            } else {
                usize::MAX - params
            };
            (rank, endpoint.path.len(), endpoint.path.clone())
        })
}
