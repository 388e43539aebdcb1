//! Embedded, idempotent schema bootstrap.
//!
//! Every statement is `IF NOT EXISTS`, so `ensure_schema` is safe to run on
//! every startup against both SQLite (tests/dev) and Postgres. Uniqueness and
//! non-negativity invariants are enforced in application logic; the unique
//! indexes here are a backstop, not the primary enforcement.

use sea_orm::{ConnectionTrait, DatabaseBackend, DbErr, Statement};
use tracing::info;

struct ColumnTypes {
    uuid: &'static str,
    timestamp: &'static str,
    date: &'static str,
    money: &'static str,
    json: &'static str,
    boolean: &'static str,
}

fn column_types(backend: DatabaseBackend) -> ColumnTypes {
    match backend {
        DatabaseBackend::Postgres => ColumnTypes {
            uuid: "UUID",
            timestamp: "TIMESTAMPTZ",
            date: "DATE",
            money: "NUMERIC(12, 2)",
            json: "JSONB",
            boolean: "BOOLEAN",
        },
        // SQLite stores everything by affinity; REAL round-trips Decimal
        // through the driver, TEXT carries timestamps, dates, and uuids.
        _ => ColumnTypes {
            uuid: "TEXT",
            timestamp: "TEXT",
            date: "TEXT",
            money: "REAL",
            json: "TEXT",
            boolean: "INTEGER",
        },
    }
}

fn table_statements(t: &ColumnTypes) -> Vec<String> {
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS stores (
                id {uuid} PRIMARY KEY,
                name TEXT NOT NULL,
                contact_name TEXT,
                email TEXT,
                phone TEXT,
                address TEXT,
                credit_limit {money} NOT NULL,
                current_balance {money} NOT NULL,
                is_active {boolean} NOT NULL,
                created_at {ts} NOT NULL,
                updated_at {ts}
            )",
            uuid = t.uuid,
            money = t.money,
            boolean = t.boolean,
            ts = t.timestamp,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS products (
                id {uuid} PRIMARY KEY,
                name TEXT NOT NULL,
                sku TEXT NOT NULL,
                category TEXT,
                unit TEXT NOT NULL,
                price {money} NOT NULL,
                cost {money} NOT NULL,
                min_stock_level INTEGER NOT NULL,
                is_active {boolean} NOT NULL,
                created_at {ts} NOT NULL,
                updated_at {ts}
            )",
            uuid = t.uuid,
            money = t.money,
            boolean = t.boolean,
            ts = t.timestamp,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS orders (
                id {uuid} PRIMARY KEY,
                order_number TEXT NOT NULL,
                store_id {uuid} NOT NULL,
                status TEXT NOT NULL,
                subtotal {money} NOT NULL,
                discount_amount {money} NOT NULL,
                final_amount {money} NOT NULL,
                notes TEXT,
                auto_generated {boolean} NOT NULL,
                approved_by {uuid},
                approved_at {ts},
                created_at {ts} NOT NULL,
                updated_at {ts},
                version INTEGER NOT NULL
            )",
            uuid = t.uuid,
            money = t.money,
            boolean = t.boolean,
            ts = t.timestamp,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS order_items (
                id {uuid} PRIMARY KEY,
                order_id {uuid} NOT NULL,
                product_id {uuid} NOT NULL,
                quantity INTEGER NOT NULL,
                unit_price {money} NOT NULL,
                line_total {money} NOT NULL
            )",
            uuid = t.uuid,
            money = t.money,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS stock_records (
                id {uuid} PRIMARY KEY,
                store_id {uuid} NOT NULL,
                product_id {uuid} NOT NULL,
                quantity INTEGER NOT NULL,
                updated_by {uuid},
                created_at {ts} NOT NULL,
                updated_at {ts}
            )",
            uuid = t.uuid,
            ts = t.timestamp,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS kitchen_sheets (
                id {uuid} PRIMARY KEY,
                order_id {uuid} NOT NULL,
                status TEXT NOT NULL,
                created_at {ts} NOT NULL,
                completed_at {ts}
            )",
            uuid = t.uuid,
            ts = t.timestamp,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS kitchen_sheet_items (
                id {uuid} PRIMARY KEY,
                sheet_id {uuid} NOT NULL,
                product_id {uuid} NOT NULL,
                quantity INTEGER NOT NULL,
                prepared {boolean} NOT NULL,
                batch_number TEXT,
                expiry_date {date},
                prepared_by {uuid},
                prepared_at {ts}
            )",
            uuid = t.uuid,
            boolean = t.boolean,
            date = t.date,
            ts = t.timestamp,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS deliveries (
                id {uuid} PRIMARY KEY,
                order_id {uuid} NOT NULL,
                status TEXT NOT NULL,
                assigned_to {uuid},
                scheduled_for {ts},
                delivered_at {ts},
                temperature_celsius {money},
                proof_reference TEXT,
                created_at {ts} NOT NULL,
                updated_at {ts}
            )",
            uuid = t.uuid,
            money = t.money,
            ts = t.timestamp,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS delivery_notes (
                id {uuid} PRIMARY KEY,
                delivery_id {uuid} NOT NULL,
                note_number TEXT NOT NULL,
                issued_at {ts} NOT NULL
            )",
            uuid = t.uuid,
            ts = t.timestamp,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS invoices (
                id {uuid} PRIMARY KEY,
                order_id {uuid} NOT NULL,
                invoice_number TEXT NOT NULL,
                subtotal {money} NOT NULL,
                discount_amount {money} NOT NULL,
                return_amount {money} NOT NULL,
                total_amount {money} NOT NULL,
                due_date {ts} NOT NULL,
                payment_status TEXT NOT NULL,
                created_at {ts} NOT NULL,
                updated_at {ts}
            )",
            uuid = t.uuid,
            money = t.money,
            ts = t.timestamp,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS returns (
                id {uuid} PRIMARY KEY,
                delivery_id {uuid} NOT NULL,
                product_id {uuid} NOT NULL,
                quantity INTEGER NOT NULL,
                reason TEXT NOT NULL,
                batch_number TEXT,
                expiry_date {date},
                unit_price {money} NOT NULL,
                amount {money} NOT NULL,
                created_by {uuid} NOT NULL,
                created_at {ts} NOT NULL
            )",
            uuid = t.uuid,
            date = t.date,
            money = t.money,
            ts = t.timestamp,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS payments (
                id {uuid} PRIMARY KEY,
                invoice_id {uuid} NOT NULL,
                amount {money} NOT NULL,
                method TEXT NOT NULL,
                status TEXT NOT NULL,
                transaction_ref TEXT,
                created_at {ts} NOT NULL
            )",
            uuid = t.uuid,
            money = t.money,
            ts = t.timestamp,
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS notifications (
                id {uuid} PRIMARY KEY,
                recipient_id {uuid} NOT NULL,
                kind TEXT NOT NULL,
                message TEXT NOT NULL,
                data {json},
                read {boolean} NOT NULL,
                created_at {ts} NOT NULL
            )",
            uuid = t.uuid,
            json = t.json,
            boolean = t.boolean,
            ts = t.timestamp,
        ),
    ]
}

const INDEX_STATEMENTS: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_products_sku ON products (sku)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_orders_number ON orders (order_number)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_stock_store_product ON stock_records (store_id, product_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_kitchen_sheets_order ON kitchen_sheets (order_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_deliveries_order ON deliveries (order_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_invoices_order ON invoices (order_id)",
    "CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items (order_id)",
    "CREATE INDEX IF NOT EXISTS idx_returns_delivery ON returns (delivery_id)",
    "CREATE INDEX IF NOT EXISTS idx_payments_invoice ON payments (invoice_id)",
];

/// Creates any missing tables and indexes.
pub async fn ensure_schema<C: ConnectionTrait>(db: &C) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let types = column_types(backend);

    for sql in table_statements(&types) {
        db.execute(Statement::from_string(backend, sql)).await?;
    }
    for sql in INDEX_STATEMENTS {
        db.execute(Statement::from_string(backend, sql.to_string()))
            .await?;
    }

    info!("schema ensured");
    Ok(())
}
