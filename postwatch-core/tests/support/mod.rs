use std::sync::Arc;

use postwatch_core::{
    Registry,
    testing::{sample_channel, sample_resource},
};

/// Registry with one entry per `(channel id, author, date)`.
#[allow(dead_code)]
pub fn registry_of(entries: &[(&str, &str, &str)]) -> Arc<Registry> {
    let mut builder = Registry::builder();
    for (channel, author, date) in entries {
        let resource = sample_resource(author, date);
        let target = resource.resource_id().as_str().to_string();
        builder
            .insert(resource, sample_channel(channel, &target))
            .expect("fixture entries are unique");
    }
    Arc::new(builder.build())
}
