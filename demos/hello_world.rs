//! Hello World demo - drive the binding from Rust instead of a script.
//!
//! Run with: cargo run --example hello_world
//! With native MPI: mpiexec -n 4 cargo run --features mpi --example hello_world

use mpish::{default_backend, Interp, Result, Shell};

fn main() -> Result<()> {
    let mut shell = Shell::new(Interp::new(default_backend()));

    shell.eval_script("mpi::init")?;

    let rank = shell.eval_script("mpi::comm_rank mpi::comm_world")?;
    let size = shell.eval_script("mpi::comm_size mpi::comm_world")?;
    println!("Hello from rank {rank} of {size}");

    // Synchronize before exiting
    shell.eval_script("mpi::barrier mpi::comm_world")?;

    if rank == "0" {
        println!("All processes reported in.");
    }

    shell.eval_script("mpi::finalize")?;
    Ok(())
}
