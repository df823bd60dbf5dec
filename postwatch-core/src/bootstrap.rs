use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::channel::ChannelSubscriber;
use crate::error::SubscribeError;
use crate::model::{ChannelId, Resource};
use crate::registry::{Registry, RegistryBuilder};

/// Summary of the subscription pass.
#[derive(Debug, Default)]
pub struct BootstrapReport {
    pub subscribed: usize,
    pub failed: Vec<(Resource, SubscribeError)>,
}

/// Subscribe to every catalogued resource and build the registry.
///
/// Subscriptions run one after another. A failed subscription leaves that
/// resource unwatched and does not stop the others.
pub async fn build_registry(
    catalog: &Catalog,
    subscriber: &ChannelSubscriber,
) -> (Registry, BootstrapReport) {
    let mut builder = RegistryBuilder::new();
    let mut report = BootstrapReport::default();

    for resource in &catalog.resources {
        if builder.watches(resource.resource_id()) {
            warn!(post = %resource.key, "resource already watched, skipping");
            report.failed.push((
                resource.clone(),
                SubscribeError::AlreadyWatched(resource.resource_id().clone()),
            ));
            continue;
        }

        let id = unused_channel_id(&builder, subscriber);
        let record = match subscriber.subscribe(resource, id).await {
            Ok(record) => record,
            Err(err) => {
                report.failed.push((resource.clone(), err));
                continue;
            }
        };

        // The remote channel is already live.
        if let Err(source) = builder.insert(resource.clone(), record.clone()) {
            warn!(
                post = %resource.key,
                channel_id = %record.id,
                error = %source,
                "confirmed channel could not be registered, stopping it"
            );
            if let Err(err) = subscriber.unsubscribe(&record).await {
                warn!(channel_id = %record.id, error = %err, "failed to stop unregistered channel");
            }
            report.failed.push((
                resource.clone(),
                SubscribeError::Unregistered {
                    channel_id: record.id.clone(),
                    source,
                },
            ));
            continue;
        }
        report.subscribed += 1;
    }

    info!(
        subscribed = report.subscribed,
        failed = report.failed.len(),
        "subscription pass finished"
    );
    (builder.build(), report)
}

fn unused_channel_id(builder: &RegistryBuilder, subscriber: &ChannelSubscriber) -> ChannelId {
    loop {
        let id = subscriber.generate_id();
        if !builder.contains_channel(&id) {
            return id;
        }
    }
}
