//! Minimal walkthrough: declare events and subscribers, publish, inspect stats.
//!
//! Run with `cargo run --example hello_bus`.

use std::sync::Arc;

use eventlib::{
    impl_event, EventBus, HandlerResult, Priority, Subscriber, SubscriberScan,
};

trait Announcement: Send + Sync {
    fn headline(&self) -> String;
}

#[derive(Debug)]
struct ServerStarted {
    port: u16,
}

impl Announcement for ServerStarted {
    fn headline(&self) -> String {
        format!("server listening on port {}", self.port)
    }
}

impl_event!(ServerStarted => dyn Announcement);

#[derive(Debug)]
struct PlayerJoined {
    name: String,
}

impl_event!(PlayerJoined);

struct Greeter;

impl Greeter {
    fn on_join(&self, event: &PlayerJoined) -> HandlerResult {
        println!("welcome, {}!", event.name);
        Ok(())
    }
}

impl Subscriber for Greeter {
    fn describe(scan: &mut SubscriberScan<Self>) {
        scan.handler("on_join", Priority::NORMAL, Greeter::on_join);
    }
}

struct Billboard;

impl Billboard {
    // Bound to the trait view, so it sees every announcement type.
    fn on_announcement(&self, event: &dyn Announcement) -> HandlerResult {
        println!("[billboard] {}", event.headline());
        Ok(())
    }
}

impl Subscriber for Billboard {
    fn describe(scan: &mut SubscriberScan<Self>) {
        scan.handler("on_announcement", Priority::HIGH, Billboard::on_announcement);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let bus = EventBus::new();
    bus.register(&Arc::new(Greeter)).unwrap();
    bus.register(&Arc::new(Billboard)).unwrap();

    bus.publish(&ServerStarted { port: 7777 });
    bus.publish(&PlayerJoined {
        name: "alex".into(),
    });
    bus.publish(&PlayerJoined {
        name: "sam".into(),
    });

    let stats = bus.stats();
    println!(
        "published {} events, invoked {} handlers ({} thunks synthesized)",
        stats.events_published, stats.handlers_invoked, stats.synthesized_thunks
    );
}
