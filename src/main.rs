use std::error::Error;
use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};

use bus::{Bus, MainCommand, MainEvent};
use core_types::InstanceId;
use main_thread::MemoryHost;
use mimalloc::MiMalloc;
use runtime_background::{Commit, CommitConfig, Committer};
use runtime_main::{MainRuntimeConfig, PAGE_ROOT, start_main_runtime};
use serde_json::json;
use snapshot::template::update;
use snapshot::{
    BackgroundTree, NodeType, SerializedSnapshot, SlotKind, SnapshotTemplate, TemplateRegistry, Value,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn registry() -> TemplateRegistry {
    let mut registry = TemplateRegistry::new();
    registry.register(
        SnapshotTemplate::new("todos")
            .create(|host| vec![host.create_element("view")])
            .update(0, update::attribute(0, "class"))
            .slot(SlotKind::Children, 0),
    );
    registry.register(
        SnapshotTemplate::new("todo")
            .create(|host| vec![host.create_element("text")])
            .update(0, update::attribute(0, "label")),
    );
    registry
}

/// What the main thread renders on its own before the background runs.
fn first_screen(items: &[&str]) -> SerializedSnapshot {
    let todos = items
        .iter()
        .zip(3..)
        .map(|(label, id)| SerializedSnapshot::new(InstanceId(-id), "todo").with_values(vec![json!(label)]))
        .collect();
    let list = SerializedSnapshot::new(InstanceId(-2), "todos")
        .with_values(vec![json!("list")])
        .with_children(todos);
    SerializedSnapshot::new(PAGE_ROOT, NodeType::root()).with_children(vec![list])
}

fn render(tree: &mut BackgroundTree, items: &[&str]) -> Result<InstanceId, Box<dyn Error>> {
    let root = tree.create(NodeType::root())?;
    let list = tree.create("todos")?;
    tree.set_values(list, vec![Value::from("list")])?;
    for label in items {
        let todo = tree.create("todo")?;
        tree.set_values(todo, vec![Value::from(*label)])?;
        tree.append_child(list, todo)?;
    }
    tree.append_child(root, list)?;
    Ok(root)
}

fn ship(
    cmd_tx: &Sender<MainCommand>,
    evt_rx: &Receiver<MainEvent>,
    committer: &mut Committer,
    commit: Commit,
) -> Result<(), Box<dyn Error>> {
    cmd_tx.send(MainCommand::PatchUpdate(commit.update))?;
    match evt_rx.recv_timeout(Duration::from_secs(5))? {
        MainEvent::CommitDone { ids, .. } => {
            for id in ids {
                let refs = committer.on_commit_done(id, Instant::now());
                log::debug!("commit {id} acknowledged, {} refs to clear", refs.len());
            }
            Ok(())
        }
        MainEvent::PatchFailed { error, .. } => Err(error.into()),
        other => Err(format!("unexpected event {other:?}").into()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let Bus {
        cmd_tx,
        cmd_rx,
        evt_tx,
        evt_rx,
    } = Bus::new();
    let main = start_main_runtime(
        MainRuntimeConfig {
            log_patches: true,
            ..MainRuntimeConfig::default()
        },
        registry(),
        MemoryHost::new(),
        first_screen(&["milk", "eggs"]),
        cmd_rx,
        evt_tx,
    );

    let MainEvent::FirstScreen { tree: screen } = evt_rx.recv()? else {
        return Err("main runtime did not publish a first screen".into());
    };

    let mut background = BackgroundTree::new(registry());
    let root = render(&mut background, &["milk", "eggs", "bread"])?;
    let mut committer = Committer::new(CommitConfig {
        gc_delay: Duration::ZERO,
        ..CommitConfig::default()
    });
    if let Some(commit) = committer.commit_hydration(&mut background, &screen, root)? {
        ship(&cmd_tx, &evt_rx, &mut committer, commit)?;
    }

    // Check off the first todo and move the last one to the top.
    let list = background
        .first_child(PAGE_ROOT)
        .ok_or("page has no list")?;
    let todos = background.child_nodes(list);
    if let (Some(&first), Some(&last)) = (todos.first(), todos.last()) {
        background.remove_child(list, first)?;
        background.insert_before(list, last, todos.get(1).copied())?;
    }
    if let Some(commit) = committer.commit(&mut background)? {
        ship(&cmd_tx, &evt_rx, &mut committer, commit)?;
    }
    let collected = committer.collect_garbage(&mut background, Instant::now());
    log::info!("collected {collected} background instances");

    cmd_tx.send(MainCommand::Shutdown)?;
    let tree = main.join().map_err(|_| "main runtime panicked")?;
    for line in tree.host().render() {
        println!("{line}");
    }
    Ok(())
}
