//! End-to-end tests over the sales snowflake
//!
//! ```text
//! sale
//! ├── product ── category
//! ├── employee ── department, employee_location
//! └── customer ── customer_location
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use star_schema::graph::load_from_path;
use star_schema::{
    BuildConfig, ColumnRef, CompareOp, JoinOverride, JoinOverrides, SchemaError, SchemaGraph,
    SelectRequest, Table, TopologyNode,
};

fn fixtures_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn sales() -> SchemaGraph {
    let sale = Table::new("sale")
        .with_primary_key("id")
        .with_columns(["total", "sold_at"])
        .foreign_key("product_id", "product", "id")
        .foreign_key("employee_id", "employee", "id")
        .foreign_key("customer_id", "customer", "id");
    let product = Table::new("product")
        .with_primary_key("id")
        .column("name")
        .foreign_key("category_id", "category", "id");
    let category = Table::new("category").with_primary_key("id").column("label");
    let employee = Table::new("employee")
        .with_primary_key("id")
        .column("name")
        .foreign_key("department_id", "department", "id")
        .foreign_key("location_id", "location", "id");
    let department = Table::new("department").with_primary_key("id").column("name");
    let customer = Table::new("customer")
        .with_primary_key("id")
        .column("name")
        .foreign_key("location_id", "location", "id");
    let location = Arc::new(Table::new("location").with_primary_key("id").with_columns(["city", "country"]));

    let topology = TopologyNode::new(sale)
        .child(TopologyNode::new(product).leaf(category))
        .child(
            TopologyNode::new(employee)
                .leaf(department)
                .leaf(location.alias("employee_location")),
        )
        .child(TopologyNode::new(customer).leaf(location.alias("customer_location")));

    SchemaGraph::build(topology, &JoinOverrides::new()).unwrap()
}

fn names(graph: &SchemaGraph) -> Vec<String> {
    graph.iter().map(|n| n.name().to_string()).collect()
}

fn permutations(items: &[&'static str]) -> Vec<Vec<&'static str>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut result = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head);
            result.push(tail);
        }
    }
    result
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn test_department_selection_joins_only_its_path() {
    let graph = sales();
    let request = SelectRequest::from_names(["department.id"]);

    let plan = graph.plan_for(&request).unwrap();
    assert_eq!(plan.root, "sale");
    assert_eq!(plan.pairs(), vec![("sale", "employee"), ("employee", "department")]);
    assert_eq!(plan.steps[0].condition.to_string(), "sale.employee_id = employee.id");
    assert_eq!(plan.steps[1].condition.to_string(), "employee.department_id = department.id");
}

#[test]
fn test_root_selection_has_zero_joins() {
    let graph = sales();
    let statement = graph.select(&SelectRequest::from_names(["sale.total", "sale.id"])).unwrap();
    assert!(statement.joins().is_empty());
}

#[test]
fn test_single_node_plan_is_its_ancestor_path() {
    let graph = sales();
    for name in names(&graph) {
        let plan = graph.resolve([name.as_str(), name.as_str()]).unwrap();
        let path: Vec<&str> = graph.path(&name).unwrap().iter().map(|n| n.name()).collect();
        let expected: Vec<(&str, &str)> = path.windows(2).map(|w| (w[0], w[1])).collect();
        assert_eq!(plan.pairs(), expected, "plan for {}", name);
    }
}

#[test]
fn test_union_shares_ancestor_prefix_once() {
    let graph = sales();
    let plan = graph.resolve(["employee_location", "department"]).unwrap();
    assert_eq!(
        plan.pairs(),
        vec![
            ("sale", "employee"),
            ("employee", "department"),
            ("employee", "employee_location"),
        ]
    );
}

#[test]
fn test_plan_independent_of_request_order() {
    let graph = sales();
    let requested = ["customer_location", "category", "department", "employee_location"];
    let expected = graph.resolve(requested).unwrap();

    for order in permutations(&requested) {
        assert_eq!(graph.resolve(&order).unwrap(), expected);
    }
    assert_eq!(
        expected.pairs(),
        vec![
            ("sale", "product"),
            ("product", "category"),
            ("sale", "employee"),
            ("employee", "department"),
            ("employee", "employee_location"),
            ("sale", "customer"),
            ("customer", "customer_location"),
        ]
    );
}

#[test]
fn test_parents_precede_children() {
    let graph = sales();
    let all = names(&graph);
    let plan = graph.resolve(&all).unwrap();

    let mut joined = vec![plan.root.as_str()];
    for step in &plan.steps {
        assert!(joined.contains(&step.parent.as_str()), "{} joined before {}", step.child, step.parent);
        assert!(!joined.contains(&step.child.as_str()), "{} joined twice", step.child);
        joined.push(&step.child);
    }
    assert_eq!(joined.len(), graph.len());
}

#[test]
fn test_unknown_table_suggests_closest_name() {
    let err = sales().resolve(["departmnt"]).unwrap_err();
    assert_eq!(err.to_string(), "Unknown table 'departmnt' (did you mean 'department'?)");
}

// =============================================================================
// Detach
// =============================================================================

#[test]
fn test_detach_employee() {
    let graph = sales();
    let detached = graph.detach("employee").unwrap();

    assert_eq!(detached.root().unwrap().name(), "employee");
    assert!(!detached.contains("sale"));

    let plan = detached.plan_for(&SelectRequest::from_names(["department.id"])).unwrap();
    assert_eq!(plan.root, "employee");
    assert_eq!(plan.pairs(), vec![("employee", "department")]);

    // source graph unchanged
    assert_eq!(graph.len(), 8);
    assert_eq!(graph.resolve(["department"]).unwrap().len(), 2);
}

#[test]
fn test_detach_matches_source_restricted_to_subtree() {
    let graph = sales();
    for root in names(&graph) {
        let detached = graph.detach(&root).unwrap();
        for node in names(&detached) {
            let full = graph.resolve([node.as_str()]).unwrap();
            let restricted: Vec<_> = full
                .steps
                .into_iter()
                .filter(|step| detached.contains(&step.child) && step.child != root)
                .collect();

            let plan = detached.resolve([node.as_str()]).unwrap();
            assert_eq!(plan.root, root);
            assert_eq!(plan.steps, restricted, "{} under detached {}", node, root);
        }
    }
}

// =============================================================================
// Compose
// =============================================================================

#[test]
fn test_compose_rejects_shared_names() {
    let graph = sales();
    let employees = graph.detach("employee").unwrap();

    match graph.compose(&employees, "product", Some(JoinOverride::expression("1 = 1"))) {
        Err(SchemaError::DuplicateName { name }) => {
            assert!(["employee", "department", "employee_location"].contains(&name.as_str()));
        }
        other => panic!("Expected DuplicateName, got {:?}", other),
    }
}

#[test]
fn test_compose_detached_parts_back_together() {
    let graph = sales();
    let employees = graph.detach("employee").unwrap();
    let customers = graph.detach("customer").unwrap();
    let products = graph.detach("product").unwrap();

    let sale = graph.table("sale").unwrap().selectable().clone();
    let base = SchemaGraph::build(TopologyNode::new(sale), &JoinOverrides::new()).unwrap();

    let rebuilt = base
        .compose(&products, "sale", None)
        .and_then(|g| g.compose(&employees, "sale", None))
        .and_then(|g| g.compose(&customers, "sale", None))
        .unwrap();

    assert_eq!(names(&rebuilt), names(&graph));
    assert_eq!(rebuilt.fingerprint(), graph.fingerprint());
}

#[test]
fn test_compose_ambiguous_without_override() {
    let airport = Arc::new(Table::new("airport").with_primary_key("id").column("code"));
    let flight = Table::new("flight")
        .with_primary_key("id")
        .foreign_key("origin_id", "airport", "id")
        .foreign_key("destination_id", "airport", "id");

    let flights = SchemaGraph::build(TopologyNode::new(flight), &JoinOverrides::new()).unwrap();
    let origin = SchemaGraph::build(TopologyNode::new(airport.alias("origin")), &JoinOverrides::new()).unwrap();

    assert!(matches!(
        flights.compose(&origin, "flight", None),
        Err(SchemaError::AmbiguousJoin { .. })
    ));

    let composed = flights
        .compose(&origin, "flight", Some(JoinOverride::on([("origin_id", "id")])))
        .unwrap();
    assert_eq!(
        composed.select(&SelectRequest::from_names(["origin.code"])).unwrap().to_sql(),
        "SELECT origin.code FROM flight LEFT OUTER JOIN airport AS origin ON flight.origin_id = origin.id"
    );
}

// =============================================================================
// Construction
// =============================================================================

#[test]
fn test_two_aliases_through_two_keys_are_ambiguous() {
    let airport = Arc::new(Table::new("airport").with_primary_key("id"));
    let flight = Table::new("flight")
        .with_primary_key("id")
        .foreign_key("origin_id", "airport", "id")
        .foreign_key("destination_id", "airport", "id");

    let topology = TopologyNode::new(flight)
        .leaf(airport.alias("origin"))
        .leaf(airport.alias("destination"));

    let err = SchemaGraph::build(topology, &JoinOverrides::new()).unwrap_err();
    assert!(matches!(err, SchemaError::AmbiguousJoin { candidates: 2, .. }));
}

#[test]
fn test_fixtures_build_the_same_graph() {
    let from_json = SchemaGraph::from_path(&fixtures_path().join("sales.json"), &BuildConfig::default()).unwrap();
    let from_toml = load_from_path(&fixtures_path().join("sales.toml"))
        .unwrap()
        .build(&BuildConfig::default())
        .unwrap();

    assert_eq!(names(&from_json), names(&sales()));
    assert_eq!(from_json.fingerprint(), sales().fingerprint());
    assert_eq!(from_toml.fingerprint(), sales().fingerprint());
}

// =============================================================================
// Query assembly
// =============================================================================

#[test]
fn test_sql_for_customer_and_employee_cities() {
    let request = SelectRequest::new()
        .column("customer_location", "city")
        .column("employee_location", "city")
        .filter(ColumnRef::new("sale", "total"), CompareOp::Gt, 100);

    let sql = sales().select(&request).unwrap().to_sql();
    assert_eq!(
        sql,
        "SELECT customer_location.city, employee_location.city FROM sale \
         LEFT OUTER JOIN employee ON sale.employee_id = employee.id \
         LEFT OUTER JOIN location AS employee_location ON employee.location_id = employee_location.id \
         LEFT OUTER JOIN customer ON sale.customer_id = customer.id \
         LEFT OUTER JOIN location AS customer_location ON customer.location_id = customer_location.id \
         WHERE sale.total > 100"
    );
}

#[test]
fn test_concurrent_readers_agree() {
    let graph = Arc::new(sales());
    let expected = graph.resolve(["category", "customer_location"]).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let graph = Arc::clone(&graph);
                scope.spawn(move || graph.resolve(["customer_location", "category"]).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}
