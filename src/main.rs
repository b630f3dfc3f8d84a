// Minimal in-process demo: wires an in-memory policy store and the toy
// compiler/engine together and runs a handful of the gateway's canonical
// scenarios. Not a server and not a CLI — both are out of scope here; this
// binary exists only to exercise the pipeline end-to-end without a real SQL
// compiler or columnar engine.

use std::sync::Arc;

use lakeguard::audit::AuditLogger;
use lakeguard::demo::{ToyQueryEngine, ToySqlCompiler};
use lakeguard::policy::model::{Grant, Principal, PrincipalKind, Privilege, Securable, SecurableKind};
use lakeguard::policy::resolver::SecurableChain;
use lakeguard::policy::store::{InMemoryPolicyStore, RequestContext};
use lakeguard::policy::PolicyResolver;
use lakeguard::relplan::{BaseSchema, Field, Literal, ScalarType};
use lakeguard::{Gateway, GatewayConfig, TableCatalog};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).with_level(true).init();

    let config = GatewayConfig::default();
    let store = InMemoryPolicyStore::new();

    let catalog_id = Uuid::new_v4();
    let schema_id = Uuid::new_v4();
    let table_id = Uuid::new_v4();
    store.put_securable(Securable { id: catalog_id, kind: SecurableKind::Catalog, name: "lake".into(), parent: None });
    store.put_securable(Securable { id: schema_id, kind: SecurableKind::Schema, name: "public".into(), parent: Some(catalog_id) });
    store.put_securable(Securable { id: table_id, kind: SecurableKind::Table, name: "titanic".into(), parent: Some(schema_id) });

    let alice = Principal::new("alice", PrincipalKind::User);
    store.put_principal(alice.clone());
    store.grant(Grant { id: Uuid::new_v4(), principal: alice.id, securable: schema_id, privilege: Privilege::Usage });
    store.grant(Grant { id: Uuid::new_v4(), principal: alice.id, securable: table_id, privilege: Privilege::Select });

    let table_catalog = TableCatalog::new();
    table_catalog.register("titanic", SecurableChain { catalog: catalog_id, schema: schema_id, table: table_id });

    let schema = BaseSchema::new(vec![
        Field { name: "Pclass".into(), data_type: ScalarType::I64 },
        Field { name: "Name".into(), data_type: ScalarType::String },
    ]);

    let compiler = Arc::new(ToySqlCompiler::new());
    compiler.register_table("titanic", schema);

    let engine = Arc::new(ToyQueryEngine::new());
    engine.register_table(
        "titanic",
        vec!["Pclass".into(), "Name".into()],
        vec![
            vec![Literal::I64(1), Literal::String("Allen, Miss".into())],
            vec![Literal::I64(2), Literal::String("Beckwith, Mr".into())],
            vec![Literal::I64(3), Literal::String("Carter, Mrs".into())],
        ],
    );

    let resolver = PolicyResolver::new(Arc::new(store), config.max_group_depth);
    let audit = Arc::new(AuditLogger::new(config));
    let gateway = Gateway::new(resolver, table_catalog, compiler, engine, Arc::clone(&audit));

    let ctx = RequestContext::new();
    match gateway.query(&ctx, "alice", "SELECT * FROM titanic").await {
        Ok(mut rows) => {
            tracing::info!("query admitted, columns = {:?}", rows.columns());
            while let Some(row) = rows.next_row() {
                tracing::info!(?row, "row");
            }
        }
        Err(e) => tracing::error!(error = %e, "query denied or failed"),
    }

    audit.flush().await;
    for entry in audit.query(&lakeguard::audit::AuditQuery::all()) {
        tracing::info!(?entry, "audit entry");
    }
}
