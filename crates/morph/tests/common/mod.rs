#![allow(dead_code)]

use morph::{Operation, VirtualSchema};
use morph_schema::{Column, ForeignKey, PrimitiveKind, Schema, Table};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("morph=debug")),
        )
        .try_init();
}

pub fn orders() -> Table {
    Table::new("Order", "Orders")
        .schema("ordering")
        .column(Column::new("Order.Id", "Id", PrimitiveKind::Int32).identity())
        .column(
            Column::new("Order.Name", "Name", PrimitiveKind::String)
                .nullable()
                .max_length(128),
        )
        .key(["Order.Id"])
}

pub fn order_lines() -> Table {
    Table::new("OrderLine", "OrderLines")
        .schema("dbo")
        .column(Column::new("OrderLine.Id", "Id", PrimitiveKind::Int32).identity())
        .column(Column::new("OrderLine.OrderId", "OrderId", PrimitiveKind::Int32))
        .key(["OrderLine.Id"])
        .foreign_key(
            ForeignKey::new("Order_Lines", "Order", ["Order.Id"], ["OrderLine.OrderId"]).cascade(),
        )
}

pub fn shop() -> Schema {
    Schema::new().table(orders()).table(order_lines())
}

/// One line per operation, as displayed.
pub fn summary(ops: &[Operation]) -> String {
    ops.iter()
        .map(|op| op.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replay `ops` on `from` and check the result holds exactly the names of `to`.
pub fn assert_replays(from: &Schema, to: &Schema, ops: &[Operation]) {
    let mut simulated = VirtualSchema::from_schema(from);
    simulated
        .replay(ops)
        .unwrap_or_else(|e| panic!("replay failed: {}\n{}", e, summary(ops)));
    simulated
        .ensure_matches(to, true)
        .unwrap_or_else(|e| panic!("{}\n{}", e, summary(ops)));
}
