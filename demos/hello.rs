use anyhow::Result;
use dbus_wire::{Client, Variant};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let c = Client::session_bus().await?;
    println!("Connected as {} to {}", c.name(), c.server_guid());

    let reply = c
        .request(
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus",
            "org.freedesktop.DBus",
            "GetNameOwner",
            vec![Variant::from("org.freedesktop.DBus")],
        )
        .await?;

    dbg!(reply.body());

    let reply = c
        .request(
            "/org/freedesktop/DBus",
            "org.freedesktop.DBus",
            "org.freedesktop.DBus",
            "ListNames",
            Vec::new(),
        )
        .await?;

    if let Some(names) = reply.body().first().and_then(|v| v.value().as_array()) {
        for name in names {
            println!("{}", name.as_str().unwrap_or_default());
        }
    }

    c.close().await?;
    Ok(())
}
