#![forbid(unsafe_code)]

//! Scripted walkthrough of Refrain's refreshable regions.
//!
//! Runs three stages, printing the element tree after each step so the
//! in-place rebuilds are visible: a clicked counter, a row of bound tally
//! widgets, and an async feed that waits for the loop to start.

mod cli;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;

use refrain_core::element::Element;
use refrain_core::session::Session;
use refrain_runtime::{
    CallArgs, InstanceId, Refreshable, Result, Scheduler, SetState, use_state,
};

use cli::Opts;

fn main() {
    let opts = Opts::parse();
    init_logging();
    if let Err(error) = run(&opts) {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

/// stderr logging, `RUST_LOG` controlled, warnings only by default.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(opts: &Opts) -> Result<()> {
    let scheduler = Scheduler::new();
    stage_counter(opts, &scheduler)?;
    stage_widgets(opts, &scheduler)?;
    if opts.feed {
        stage_feed(opts, &scheduler)?;
    }
    Ok(())
}

/// One refreshable region rebuilt in place by state setters.
fn stage_counter(opts: &Opts, scheduler: &Scheduler) -> Result<()> {
    banner("stage 1: counter");
    let session = Session::open();
    let setter: Rc<RefCell<Option<SetState<u32>>>> = Rc::new(RefCell::new(None));

    let setter_in_body = Rc::clone(&setter);
    let counter = Refreshable::builder("counter", scheduler).sync(move |_call| {
        let (count, set_count) = use_state(0_u32);
        *setter_in_body.borrow_mut() = Some(set_count);
        Element::new("label").text(format!("count: {count}")).mount();
        Element::new("button").text("+1").mount();
        Ok(())
    });

    {
        let _scope = session.enter();
        Element::new("header").text("refrain counter").mount();
        counter.invoke(CallArgs::new())?.schedule(scheduler);
    }
    dump(opts, &session, "initial page");

    let set_count = setter.borrow().clone().expect("counter body ran");
    for click in 1..=opts.clicks {
        set_count.set(click)?;
    }
    dump(opts, &session, &format!("after {} clicks", opts.clicks));

    counter.dispose();
    dump(opts, &session, "after dispose");
    tracing::debug!(message = "demo.stage_done", stage = "counter", clicks = opts.clicks);

    session.close();
    Ok(())
}

/// Bound instances of one function, each with its own state.
fn stage_widgets(opts: &Opts, scheduler: &Scheduler) -> Result<()> {
    banner("stage 2: bound widgets");
    let session = Session::open();
    let setters: Rc<RefCell<HashMap<InstanceId, SetState<u32>>>> =
        Rc::new(RefCell::new(HashMap::new()));

    let setters_in_body = Rc::clone(&setters);
    let tally = Refreshable::builder("tally", scheduler).sync(move |call| {
        let (count, set_count) = use_state(0_u32);
        if let Some(instance) = call.instance() {
            setters_in_body.borrow_mut().insert(instance, set_count);
        }
        Element::new("label").text(format!("tally: {count}")).mount();
        Ok(())
    });

    let widgets: Vec<InstanceId> = (0..opts.widgets).map(|_| InstanceId::next()).collect();
    {
        let _scope = session.enter();
        for (index, &instance) in widgets.iter().enumerate() {
            let card = Element::new("card").text(format!("widget {index}")).mount();
            let _card_scope = card.enter();
            tally.bind(instance).invoke(CallArgs::new())?.schedule(scheduler);
        }
    }
    dump(opts, &session, "fresh widgets");

    // Widget N gets N+1 clicks; every card keeps its own count.
    for (index, &instance) in widgets.iter().enumerate() {
        let set_count = setters.borrow()[&instance].clone();
        for click in 1..=(index as u32 + 1) {
            set_count.set(click)?;
        }
    }
    dump(opts, &session, "after per-widget clicks");

    if let Some(&first) = widgets.first() {
        tally.bind(first).dispose();
        dump(opts, &session, "after disposing widget 0");
    }
    tracing::debug!(message = "demo.stage_done", stage = "widgets", widgets = opts.widgets);

    session.close();
    Ok(())
}

/// Async rebuilds: deferred before start, spawned afterwards.
fn stage_feed(opts: &Opts, scheduler: &Scheduler) -> Result<()> {
    banner("stage 3: async feed");
    let session = Session::open();
    let headlines: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(vec!["first light"]));

    let headlines_in_body = Rc::clone(&headlines);
    let feed = Refreshable::builder("feed", scheduler).async_fn(move |_call| {
        let headlines = Rc::clone(&headlines_in_body);
        async move {
            for headline in headlines.borrow().iter() {
                Element::new("line").text(*headline).mount();
            }
            Ok(())
        }
    });

    {
        let _scope = session.enter();
        Element::new("header").text("refrain feed").mount();
        feed.invoke(CallArgs::new())?.schedule(scheduler);
    }
    println!(
        "deferred runs waiting for start: {}",
        scheduler.startup_pending()
    );
    dump(opts, &session, "before the loop starts");

    scheduler.start();
    scheduler.run_until_stalled();
    dump(opts, &session, "after start");

    headlines.borrow_mut().push("second wave");
    feed.refresh(CallArgs::new())?;
    scheduler.run_until_stalled();
    dump(opts, &session, "after one refresh");
    tracing::debug!(message = "demo.stage_done", stage = "feed");

    session.close();
    Ok(())
}

fn banner(title: &str) {
    println!("\n=== {title} ===");
}

fn dump(opts: &Opts, session: &Session, label: &str) {
    if opts.quiet {
        return;
    }
    println!("--- {label} ---");
    print!("{}", session.dump_tree());
}
