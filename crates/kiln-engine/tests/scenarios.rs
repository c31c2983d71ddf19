//! End-to-end production scenarios against an in-memory store.

use kiln_core::{
    ActualCost, BomLine, BudgetVerdict, CoreError, Money, NewBom, NewMaterial, NewProductionOrder,
    OrderStatus, Quantity,
};
use kiln_engine::{EngineConfig, EngineError, ErrorCode, OrderFilter, ProductionEngine};

/// Material M with a price of 2.50 per unit, one BOM using 2 M per product.
struct Workshop {
    engine: ProductionEngine,
    material: String,
    bom: String,
}

async fn workshop(stock_units: i64) -> Workshop {
    workshop_with(EngineConfig::in_memory(), stock_units).await
}

async fn workshop_with(config: EngineConfig, stock_units: i64) -> Workshop {
    let engine = ProductionEngine::open(config).await.unwrap();

    let material = engine
        .create_material(NewMaterial {
            sku: "M".into(),
            name: "Material M".into(),
            unit: "kg".into(),
            purchase_price: Money::from_cents(250),
            stock: Quantity::from_units(stock_units),
        })
        .await
        .unwrap()
        .id;

    let bom = engine
        .create_bom(NewBom {
            product_name: "Widget".into(),
            product_sku: "WIDGET".into(),
            notes: None,
            lines: vec![BomLine::new(material.clone(), Quantity::from_units(2))],
        })
        .await
        .unwrap()
        .id;

    Workshop { engine, material, bom }
}

impl Workshop {
    async fn order(&self, quantity: i64) -> String {
        self.engine
            .create_order(NewProductionOrder {
                bom_id: self.bom.clone(),
                quantity,
                additional_costs: vec![],
                notes: None,
            })
            .await
            .unwrap()
            .order
            .id
    }

    async fn stock(&self) -> Quantity {
        self.engine.get_material(&self.material).await.unwrap().stock
    }
}

#[tokio::test]
async fn scenario_a_plan_commit_complete() {
    let w = workshop(10).await;

    let created = w
        .engine
        .create_order(NewProductionOrder {
            bom_id: w.bom.clone(),
            quantity: 3,
            additional_costs: vec![],
            notes: None,
        })
        .await
        .unwrap();
    assert_eq!(created.plan.lines[0].required, Quantity::from_units(6));
    assert!(created.plan.lines[0].sufficient);
    assert_eq!(created.order.materials_cost, Money::from_cents(6 * 250));

    w.engine.commit_order(&created.order.id).await.unwrap();
    assert_eq!(w.stock().await, Quantity::from_units(4));

    let done = w.engine.complete_order(&created.order.id, None).await.unwrap();
    let product = w.engine.get_product(done.product_id.as_deref().unwrap()).await.unwrap();
    assert_eq!(product.stock, 3);
}

#[tokio::test]
async fn scenario_b_commit_rejected_when_short() {
    let w = workshop(4).await;

    let created = w
        .engine
        .create_order(NewProductionOrder {
            bom_id: w.bom.clone(),
            quantity: 3,
            additional_costs: vec![],
            notes: None,
        })
        .await
        .unwrap();
    assert!(!created.plan.lines[0].sufficient);

    let err = w.engine.commit_order(&created.order.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::InsufficientStock { .. })));
    assert_eq!(w.stock().await, Quantity::from_units(4));
}

#[tokio::test]
async fn scenario_c_cancel_restores_commit() {
    let w = workshop(10).await;
    let order = w.order(3).await;

    w.engine.commit_order(&order).await.unwrap();
    assert_eq!(w.stock().await, Quantity::from_units(4));

    let cancelled = w.engine.cancel_order(&order).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(w.stock().await, Quantity::from_units(10));
}

#[tokio::test]
async fn scenario_d_variance_on_completion() {
    let w = workshop(100).await;

    // 20 units × 2 kg × 2.50 = 100.00 estimated
    let order = w.order(20).await;
    let done = w
        .engine
        .complete_order(&order, Some(ActualCost::total(Money::from_cents(15_000))))
        .await
        .unwrap();

    assert_eq!(done.total_cost, Money::from_cents(10_000));
    let analysis = done.cost_analysis.unwrap();
    assert_eq!(analysis.variance, Money::from_cents(5_000));
    assert!((analysis.variance_percentage() - 50.0).abs() < f64::EPSILON);
    assert_eq!(analysis.verdict(), BudgetVerdict::OverBudget);
}

#[tokio::test]
async fn scenario_e_unit_removal_restitutes() {
    let w = workshop(10).await;
    let order = w.order(3).await;
    let done = w.engine.complete_order(&order, None).await.unwrap();
    let product_id = done.product_id.unwrap();
    assert_eq!(w.stock().await, Quantity::from_units(4));

    // A pending order on the same BOM blocks removal entirely
    let blocker = w.order(1).await;
    let err = w.engine.delete_product_units(&product_id, 2).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ReferencedByActiveOrder);
    assert_eq!(w.stock().await, Quantity::from_units(4));
    assert_eq!(w.engine.get_product(&product_id).await.unwrap().stock, 3);

    w.engine.cancel_order(&blocker).await.unwrap();
    w.engine.delete_product_units(&product_id, 2).await.unwrap();

    assert_eq!(w.stock().await, Quantity::from_units(8));
    assert_eq!(w.engine.get_product(&product_id).await.unwrap().stock, 1);
}

#[tokio::test]
async fn terminal_orders_reject_every_action() {
    let w = workshop(100).await;

    let completed = w.order(1).await;
    w.engine.complete_order(&completed, None).await.unwrap();
    let cancelled = w.order(1).await;
    w.engine.cancel_order(&cancelled).await.unwrap();

    for id in [&completed, &cancelled] {
        for err in [
            w.engine.commit_order(id).await.unwrap_err(),
            w.engine.complete_order(id, None).await.unwrap_err(),
            w.engine.cancel_order(id).await.unwrap_err(),
        ] {
            assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
        }
    }

    // Second completion changed nothing
    let product = w.engine.find_product("WIDGET", "").await.unwrap().unwrap();
    assert_eq!(product.stock, 1);
}

#[tokio::test]
async fn cost_analysis_attached_once() {
    let w = workshop(100).await;
    let order = w.order(2).await;
    w.engine
        .complete_order(&order, Some(ActualCost::itemized(Money::from_cents(900), Money::zero())))
        .await
        .unwrap();

    let err = w
        .engine
        .attach_cost_analysis(&order, ActualCost::total(Money::from_cents(1_000)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(CoreError::CostAnalysisExists { .. })));

    let stored = w.engine.get_order(&order).await.unwrap();
    assert_eq!(stored.cost_analysis.unwrap().actual_cost, Money::from_cents(900));
}

#[tokio::test]
async fn stock_never_negative_across_mixed_operations() {
    let w = workshop(7).await;

    // 3 orders of 1 unit (2 kg each) fit, the 4th does not
    let mut orders = Vec::new();
    for _ in 0..4 {
        orders.push(w.order(1).await);
    }
    for id in &orders[..3] {
        w.engine.commit_order(id).await.unwrap();
    }
    assert!(w.engine.commit_order(&orders[3]).await.is_err());
    assert_eq!(w.stock().await, Quantity::from_units(1));

    w.engine.cancel_order(&orders[0]).await.unwrap();
    w.engine.complete_order(&orders[1], None).await.unwrap();
    w.engine.complete_order(&orders[2], None).await.unwrap();
    w.engine.commit_order(&orders[3]).await.unwrap();
    w.engine.cancel_order(&orders[3]).await.unwrap();
    assert_eq!(w.stock().await, Quantity::from_units(3));

    let product = w.engine.find_product("widget", "").await.unwrap().unwrap();
    assert_eq!(product.stock, 2);

    assert!(w.engine.delete_product_units(&product.id, 3).await.is_err());
    w.engine.delete_product_units(&product.id, 2).await.unwrap();

    assert_eq!(w.engine.get_product(&product.id).await.unwrap().stock, 0);
    assert_eq!(w.stock().await, Quantity::from_units(7));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_on_one_material_serialize() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut config = EngineConfig::default();
    config.database.path = dir.path().join("kiln.db").display().to_string();
    config.database.max_connections = 5;
    config.retry.max_attempts = 20;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 20;

    // 10 kg in stock, each order needs 6 kg
    let w = workshop_with(config, 10).await;
    let mut orders = Vec::new();
    for _ in 0..4 {
        orders.push(w.order(3).await);
    }

    let handles: Vec<_> = orders
        .into_iter()
        .map(|id| {
            let engine = w.engine.clone();
            tokio::spawn(async move { engine.commit_order(&id).await })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(order) => {
                assert_eq!(order.status, OrderStatus::InProgress);
                committed += 1;
            }
            Err(err) => assert!(
                matches!(err, EngineError::Core(CoreError::InsufficientStock { .. })),
                "unexpected error: {err:?}"
            ),
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(w.stock().await, Quantity::from_units(4));
    assert_eq!(
        w.engine
            .list_orders(&OrderFilter::status(OrderStatus::InProgress))
            .await
            .unwrap()
            .len(),
        1
    );
}
