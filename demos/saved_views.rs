/// Saved Views Example
///
/// This example demonstrates:
/// - Creating a saved view with filters, sorts and hidden columns
/// - Applying a view without saving it back
/// - Saving user changes to the active view
/// - Remembering the applied view per table on disk

use gridbase::{
    AppliedViewStore, FilterCondition, FilterOperator, GridConfig, SaveDecision, SortCriterion, Store, TableView,
    ViewConfig,
};

fn main() -> gridbase::Result<()> {
    println!("=== Gridbase Saved Views Example ===\n");

    let (mut store, table_id) = Store::with_demo_data()?;
    let columns = store.list_columns(table_id)?;
    let (name, notes, amount) = (columns[0].id, columns[1].id, columns[2].id);

    // 1. Create a view
    println!("1. Creating 'Large amounts' view...");
    let view = store.create_view(
        table_id,
        "Large amounts",
        ViewConfig {
            filters: vec![FilterCondition::new(amount, FilterOperator::GreaterThan, "900")],
            sorts: vec![SortCriterion::descending(amount), SortCriterion::ascending(name)],
            hidden_columns: vec![notes],
        },
    )?;
    println!("   View {} with {} filter(s)", view.id, view.config.filters.len());

    // 2. Apply it: the descriptor changes are not saved back
    println!("\n2. Applying the view...");
    let mut grid = TableView::open(store, table_id, GridConfig::default())?;
    grid.apply_view(&view);
    println!("   {} matching rows loaded", grid.cache().len());
    for i in 0..grid.cache().len().min(5) {
        println!(
            "   {:<12} {}",
            grid.cell_text(i, name).unwrap_or_default(),
            grid.cell_text(i, amount).unwrap_or_default()
        );
    }

    // 3. A user change to the active view is saved
    println!("\n3. Showing the Notes column again...");
    let mut config = grid.view_config().clone();
    config.hidden_columns.clear();
    match grid.set_view_config(config) {
        SaveDecision::Save { view_id, config } => {
            grid.source_mut().update_view(view_id, None, Some(config))?;
            println!("   Saved view {}", view_id);
        }
        SaveDecision::Skip => println!("   Nothing to save"),
    }

    // 4. Remember the applied view for the next session
    println!("\n4. Remembering the applied view...");
    let path = std::env::temp_dir().join("gridbase-applied-views.json");
    let mut applied = AppliedViewStore::open(&path)?;
    applied.set(table_id, view.id)?;
    let reopened = AppliedViewStore::open(&path)?;
    println!("   {} -> {:?}", path.display(), reopened.get(table_id));

    println!("\n=== Example Complete ===");
    Ok(())
}
