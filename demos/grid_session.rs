/// Grid Session Example
///
/// This example demonstrates:
/// - Opening a table in the headless grid controller
/// - Scrolling through cursor-paginated pages
/// - Mounting only the rows near the viewport
/// - Tab edits (silent) versus Enter edits (reconciling)

use gridbase::{CellPosition, CommitTrigger, GridConfig, ScrollMetrics, Store, TableView};

fn main() -> gridbase::Result<()> {
    println!("=== Gridbase Grid Session Example ===\n");

    // 1. Seed a table with 500 generated rows
    println!("1. Seeding demo data...");
    let (store, table_id) = Store::with_demo_data()?;
    println!("   Table {} has {} rows", table_id, store.count_rows(table_id)?);

    // 2. Open the grid; the first page loads immediately
    println!("\n2. Opening the grid...");
    let mut grid = TableView::open(store, table_id, GridConfig::default())?;
    println!(
        "   Loaded {} of {:?} rows, scroll extent {}px",
        grid.cache().len(),
        grid.cache().total(),
        grid.total_size()
    );

    // 3. Scroll until every page is loaded
    println!("\n3. Scrolling to the bottom...");
    let viewport = 600.0;
    loop {
        let metrics = ScrollMetrics {
            scroll_height: grid.total_size(),
            scroll_top: (grid.total_size() - viewport).max(0.0),
            client_height: viewport,
        };
        if !grid.on_scroll(metrics)? {
            break;
        }
        println!("   ... now {} rows loaded", grid.cache().len());
    }

    let mounted = grid.render(grid.total_size() - viewport, viewport);
    println!(
        "   Mounted rows {}..={} of {}",
        mounted.first().map_or(0, |r| r.item.index),
        mounted.last().map_or(0, |r| r.item.index),
        grid.cache().len()
    );

    // 4. Edit a row with Tab: no reload, focus moves right
    println!("\n4. Editing with Tab...");
    grid.set_focus(CellPosition::new(0, 0));
    for input in ["Ada King", "Countess of Lovelace"] {
        grid.begin_edit();
        grid.input(input);
        grid.commit(CommitTrigger::Tab);
        println!("   focus -> {:?}, invalidations {}", grid.focus(), grid.cache().invalidations());
    }

    // 5. Enter reconciles with the server
    println!("\n5. Editing with Enter...");
    grid.begin_edit();
    grid.input("42");
    let outcome = grid.commit(CommitTrigger::Enter);
    println!("   outcome {:?}, invalidations {}", outcome, grid.cache().invalidations());

    let columns: Vec<String> = grid.visible_columns().iter().map(|c| c.name.clone()).collect();
    let values: Vec<String> = grid
        .visible_columns()
        .iter()
        .map(|c| grid.cell_text(0, c.id).unwrap_or_default())
        .collect();
    println!("\n   {:?}", columns);
    println!("   {:?}", values);

    println!("\n=== Example Complete ===");
    Ok(())
}
