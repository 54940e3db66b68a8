//! Prints a summary of a heap dump: record counts, dump parameters, and
//! the allocator headline numbers.

use std::{env, process};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let (dump_path, exec_path) = match (args.next(), args.next()) {
        (Some(dump), Some(exec)) => (dump, exec),
        _ => {
            eprintln!("usage: heapgraph <dump> <executable>");
            process::exit(2);
        }
    };

    let dump = heapgraph::read_dump(&dump_path, &exec_path)?;

    println!("Using `{}`", dump_path);
    println!("============================================================");
    println!(
        "params: {:?} order, {}-byte pointers, heap {:#x}..{:#x}, {} cpus",
        dump.params.byte_order,
        dump.params.ptr_size,
        dump.params.heap_start,
        dump.params.heap_end,
        dump.params.ncpu
    );
    println!();
    println!("objects:    {}", dump.objects.len());
    println!("types:      {}", dump.types.len());
    println!("frames:     {}", dump.frames.len());
    println!("goroutines: {}", dump.goroutines.len());
    println!("data roots: {}", dump.dataroots.len());
    println!("other roots:{}", dump.otherroots.len());
    println!("finalizers: {}", dump.finalizers.len());
    println!("itabs:      {}", dump.itabs.len());
    println!("os threads: {}", dump.osthreads.len());

    let edges: usize = dump.objects.iter().map(|o| o.edges.len()).sum();
    let frame_edges: usize = dump.frames.iter().map(|f| f.edges.len()).sum();
    println!("edges:      {} from objects, {} from frames", edges, frame_edges);

    if let Some(stats) = &dump.memstats {
        println!();
        println!("heap alloc: {} of {} in use", stats.heap_alloc, stats.heap_inuse);
        println!("objects:    {}", stats.heap_objects);
        println!("gc cycles:  {}, {}ns paused", stats.num_gc, stats.pause_total_ns);
    }

    Ok(())
}
