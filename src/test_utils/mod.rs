pub mod random_bam;
