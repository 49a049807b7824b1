//! Ring communication demo - pass a growing list around the ranks.
//!
//! Run with: cargo run --example ring
//! With native MPI: mpiexec -n 4 cargo run --features mpi --example ring
//!
//! On one rank the "ring" degenerates to a self-send, which still
//! exercises the full send/probe/recv path.

use mpish::{default_backend, Interp, Result, Shell};

fn main() -> Result<()> {
    let mut shell = Shell::new(Interp::new(default_backend()));

    shell.eval_script("mpi::init")?;
    let rank: i32 = shell
        .eval_script("mpi::comm_rank mpi::comm_world")?
        .parse()
        .unwrap_or(0);
    let size: i32 = shell
        .eval_script("mpi::comm_size mpi::comm_world")?
        .parse()
        .unwrap_or(1);

    let next = (rank + 1) % size;
    let prev = (rank + size - 1) % size;

    // Rank 0 starts the token; everyone appends their rank and forwards.
    if rank == 0 {
        shell.eval_script(&format!(
            "mpi::send 0 mpi::int {next} 1 mpi::comm_world"
        ))?;
        let token = shell.eval_script(&format!(
            "mpi::recv mpi::int {prev} 1 mpi::comm_world"
        ))?;
        println!("token after one round: {token}");
    } else {
        let token = shell.eval_script(&format!(
            "mpi::recv mpi::int {prev} 1 mpi::comm_world"
        ))?;
        shell.eval_script(&format!(
            "mpi::send {{{token} {rank}}} mpi::int {next} 1 mpi::comm_world"
        ))?;
    }

    shell.eval_script("mpi::finalize")?;
    Ok(())
}
