pub mod second_opinion;
