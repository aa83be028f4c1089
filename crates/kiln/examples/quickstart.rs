//! Walk through the allocators and a shared atomic counter.
//!
//! The library logs through the `log` facade and installs no logger, so
//! this example prints only its own output.

use std::thread;

use kiln::prelude::*;

fn main() -> Result<(), MemError> {
    let mut mem = Memory::new(MemoryConfig::new(64 * 1024, 4 * 1024))?;
    println!("context: {} bytes, {} reserved", mem.size(), mem.reserved());

    // Heap
    let buf = mem.allocate(100).ok_or(MemError::OutOfMemory { requested: 100 })?;
    mem.space().write_cstr(buf, "hello from the heap");
    println!("heap string: {}", mem.space().read_cstr(buf));
    mem.free(buf)?;

    // Stack frames
    let frame = mem.stack_frame_begin(64)?;
    mem.space().write::<f64>(frame.data(), std::f64::consts::PI);
    println!("stack f64: {}", mem.space().read::<f64>(frame.data()));
    mem.stack_frame_end(frame);

    // Lookaside slab
    let mut slab = mem.build_lookaside(24, 16)?;
    let space = mem.space().clone();
    let record = slab.alloc(&space).ok_or(MemError::OutOfMemory { requested: 24 })?;
    slab.release(&space, record)?;
    mem.destroy_lookaside(slab)?;

    // Struct layout with an atomic counter shared by worker threads
    let counter = define_heap_struct(&mem, &[("label", "str8"), ("hits", "au32")])?;
    let obj = counter.allocate(&mut mem)?;
    obj.set(&mut mem, "label", "requests")?;
    let hits = counter.atomic::<u32>("hits")?;
    let base = obj.ptr();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let space = AddressSpace::from_shared(mem.shared_buffer(), None)?;
            Ok::<_, MemError>(thread::spawn(move || {
                for _ in 0..1000 {
                    hits.fetch_add(&space, base, 1);
                }
            }))
        })
        .collect::<Result<_, MemError>>()?;
    for worker in workers {
        let _ = worker.join();
    }
    println!(
        "{} = {}",
        obj.get(mem.space(), "label")?,
        hits.load(mem.space(), base)
    );
    obj.deallocate(&mut mem)?;

    // Packed 5-bit array
    let packed = BitfieldArray::allocate(&mut mem, 32, 5)?;
    for i in 0..packed.len() {
        packed.store(mem.space(), i, i as u32);
    }
    println!("packed[31] = {}", packed.load(mem.space(), 31));
    mem.free(packed.base())?;

    println!("done: {} reserved", mem.reserved());
    Ok(())
}
