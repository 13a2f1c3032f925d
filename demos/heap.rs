use std::io::Read;

use segallocator::{Heap, HeapConfig, logging};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just watch the program break move as the heap grows.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

#[cfg(unix)]
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    segallocator::Sbrk::program_break(),
  );
}

#[cfg(unix)]
fn print_heap<A: segallocator::AddressSpace>(heap: &Heap<A>) {
  for block in heap.blocks() {
    println!(
      "    {:?}  {:>6} bytes  {}",
      block.payload,
      block.size,
      if block.allocated { "allocated" } else { "free" }
    );
  }
}

#[cfg(unix)]
fn main() {
  logging::init();

  print_program_break("start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Create a heap on top of the real program break. The first chunk
  //    is requested right away.
  // --------------------------------------------------------------------
  let space = segallocator::Sbrk::new().expect("program break is movable");
  let mut heap = Heap::new(space, HeapConfig::from_env()).expect("initial heap chunk");
  println!("\n[1] Heap created");
  print_program_break("after init");
  print_heap(&heap);

  block_until_enter_pressed();

  unsafe {
    // --------------------------------------------------------------------
    // 2) A handful of small allocations, carved from the first chunk.
    // --------------------------------------------------------------------
    let a = heap.allocate(4).unwrap().as_ptr();
    let b = heap.allocate(12).unwrap().as_ptr();
    let c = heap.allocate(32).unwrap().as_ptr();
    (a as *mut u32).write(0xDEADBEEF);
    b.write_bytes(0xAB, 12);
    println!("\n[2] a = {a:?}, b = {b:?}, c = {c:?}");
    println!("[2] Value written to a = 0x{:X}", (a as *mut u32).read());
    print_heap(&heap);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Free `b`: it sits between two live blocks, so it becomes a hole.
    //    Freeing `a` next merges the two into one free block.
    // --------------------------------------------------------------------
    heap.deallocate(b);
    println!("\n[3] Freed b");
    print_heap(&heap);
    heap.deallocate(a);
    println!("[3] Freed a (merged with b)");
    print_heap(&heap);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) A small request reuses the hole instead of growing the heap.
    // --------------------------------------------------------------------
    let d = heap.allocate(2).unwrap().as_ptr();
    println!(
      "\n[4] d = {d:?}: {}",
      if d == a { "reused the freed hole" } else { "allocated somewhere else" }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) A 64 KiB request does not fit: the heap grows.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");
    // The system allocator shares the break; if it moved it since our last
    // growth the heap cannot extend contiguously and the request fails.
    let big = heap.allocate(64 * 1024);
    match big {
      Some(big) => println!("\n[5] big = {:?}", big.as_ptr()),
      None => println!("\n[5] big: the break was moved by someone else, heap cannot grow"),
    }
    print_program_break("after large alloc");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Grow `c`: its contents move to a larger block.
    // --------------------------------------------------------------------
    c.write_bytes(0x11, 32);
    let c = heap.reallocate(c, 500).unwrap().as_ptr();
    println!("\n[6] c moved to {c:?}, first byte = 0x{:X}", c.read());

    if let Some(big) = big {
      heap.deallocate(big.as_ptr());
    }
    heap.deallocate(c);
    heap.deallocate(d);
  }

  let report = heap.validate(true);
  println!("\n[7] {report}");
  println!("[7] {:?}", heap.stats());

  // The heap never shrinks; the OS reclaims the break when the process exits.
  println!("\n[8] End of example.");
}

#[cfg(not(unix))]
fn main() {
  logging::init();
  println!("This demo drives the process break through sbrk(2) and needs a Unix target.");
}
