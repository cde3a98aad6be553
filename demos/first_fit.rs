use std::io::Read;

use firstfit::{Allocator, Sbrk, print_alloc};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap` or
/// `gdb` between steps.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    Sbrk::program_break(),
  );
}

fn print_blocks(allocator: &Allocator<Sbrk>) {
  for block in allocator.blocks() {
    println!(
      "    block {:#x}: {:>5} bytes, {}",
      block.addr,
      block.size,
      if block.is_free { "free" } else { "used" }
    );
  }
}

fn main() -> Result<(), firstfit::AllocError> {
  env_logger::init();

  let mut allocator = Allocator::sbrk();

  print_program_break("start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Allocate 20 bytes, then 30 (rounded up to 32).
  // --------------------------------------------------------------------
  let a = allocator.allocate(20)?;
  println!("\n[1] Allocate 20 bytes");
  print_alloc(20, a.as_ptr());

  let b = allocator.allocate(30)?;
  println!("[1] Allocate 30 bytes");
  print_alloc(30, b.as_ptr());
  print_blocks(&allocator);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Zero-allocate 10 x u32 and check it reads back as zeros.
  // --------------------------------------------------------------------
  let zeroed = allocator.zero_allocate(10, 4)?;
  println!("\n[2] Zero-allocate 10 x 4 bytes");
  print_alloc(40, zeroed.as_ptr());

  let all_zero = (0..40).all(|i| unsafe { *zeroed.as_ptr().add(i) } == 0);
  println!("[2] All 40 bytes zero? {}", all_zero);

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Release the first block. It is not the tail, so it stays in the
  //    list as a free block and the break does not move.
  // --------------------------------------------------------------------
  allocator.release(a);
  println!("\n[3] Released the 20-byte block");
  print_blocks(&allocator);
  print_program_break("after release");

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) A small request is served from the freed block (first fit).
  // --------------------------------------------------------------------
  let c = allocator.allocate(8)?;
  println!("\n[4] Allocate 8 bytes (check reuse of freed block)");
  print_alloc(8, c.as_ptr());
  println!(
    "[4] reused the freed block? {}",
    if c == a { "Yes" } else { "No" }
  );

  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Releasing a foreign pointer is reported and ignored.
  // --------------------------------------------------------------------
  let mut local = 0u32;
  let foreign = std::ptr::NonNull::from(&mut local).cast::<u8>();
  println!("\n[5] Release a stack address: {:?}", allocator.try_release(foreign));

  // --------------------------------------------------------------------
  // 6) Release everything. The tail merges backwards and the break drops
  //    back to where it started.
  // --------------------------------------------------------------------
  allocator.release(zeroed);
  allocator.release(c);
  allocator.release(b);
  println!("\n[6] Released everything, {} blocks tracked", allocator.blocks().count());
  print_program_break("end");

  Ok(())
}
